use crate::error::{Fault, PipelineError};
use crate::server::worker::WorkerError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Error returned by HTTP handlers, rendered as `{"error": message}`.
#[derive(Debug)]
pub enum ApiError {
    /// Request rejected before any pipeline work.
    BadRequest { message: String },
    Worker(WorkerError),
    Pipeline(PipelineError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Worker(WorkerError::Busy) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(e) => status_for_fault(e.fault()),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest { message } => message.clone(),
            ApiError::Worker(WorkerError::Busy) => "server busy, retry later".to_string(),
            ApiError::Worker(_) => "internal server error".to_string(),
            ApiError::Pipeline(e) => e.public_message(),
        }
    }
}

pub fn status_for_fault(fault: Fault) -> StatusCode {
    match fault {
        Fault::Client => StatusCode::BAD_REQUEST,
        Fault::Server => StatusCode::INTERNAL_SERVER_ERROR,
        Fault::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Fault::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        ApiError::Pipeline(error)
    }
}

impl From<WorkerError> for ApiError {
    fn from(error: WorkerError) -> Self {
        ApiError::Worker(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Pipeline(e) if status.is_server_error() => {
                tracing::error!(error = %e, kind = ?e.kind(), "request failed")
            }
            ApiError::Worker(e) => tracing::warn!(error = %e, "request not processed"),
            _ => tracing::debug!(status = status.as_u16(), error = %self.message(), "request rejected"),
        }

        (
            status,
            Json(json!({
                "error": self.message(),
            })),
        )
            .into_response()
    }
}
