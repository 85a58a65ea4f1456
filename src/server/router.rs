use crate::server::handlers;
use crate::server::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Room for multipart boundaries and small form fields on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// API routes plus `/media` serving synthesized files from `media_root`.
pub fn create_router(state: AppState, media_root: &Path) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/v1/transcribe/", post(handlers::transcribe))
        .route("/api/v1/translate/", post(handlers::translate))
        .route("/api/v1/tts/", post(handlers::tts))
        .route("/api/v1/ping/", get(handlers::ping))
        .route("/api/v1/pipeline/", post(handlers::pipeline))
        .nest_service("/media", ServeDir::new(media_root))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        .with_state(state)
}
