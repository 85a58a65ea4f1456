use crate::history::HistoryLog;
use crate::server::worker::WorkerPool;
use std::sync::Arc;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<WorkerPool>,
    pub history: Option<Arc<HistoryLog>>,
    /// Largest accepted audio upload, in bytes
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pool: WorkerPool, max_upload_bytes: usize) -> Self {
        Self {
            pool: Arc::new(pool),
            history: None,
            max_upload_bytes,
        }
    }

    pub fn with_history(mut self, history: HistoryLog) -> Self {
        self.history = Some(Arc::new(history));
        self
    }
}
