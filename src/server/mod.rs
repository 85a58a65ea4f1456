//! HTTP endpoints over a shared pipeline.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod worker;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;
pub use worker::{WorkerError, WorkerPool};

use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryLog;
use crate::pipeline::Pipeline;
use crate::tts::cloud::TTS_SUBDIR;
use std::sync::Arc;

/// Serve the API until Ctrl-C.
pub async fn serve(pipeline: Arc<Pipeline>, config: &Config) -> Result<()> {
    let pool = WorkerPool::new(pipeline, config.server.workers, config.server.queue_depth);
    let mut state = AppState::new(pool, config.audio.max_upload_bytes);
    if let Some(path) = &config.history.path {
        state = state.with_history(HistoryLog::new(path));
    }

    std::fs::create_dir_all(config.tts.media_root.join(TTS_SUBDIR))?;
    let app = create_router(state, &config.tts.media_root);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        base_url = %config.tts.base_url,
        media_root = %config.tts.media_root.display(),
        "HTTP server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
