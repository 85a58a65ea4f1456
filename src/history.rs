//! Append-only translation history as JSON lines.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// One translated utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub input_text: String,
    pub translation: String,
    pub speech_url: Option<String>,
    /// RFC 3339, UTC, second precision
    pub created_at: String,
}

impl HistoryRecord {
    pub fn new(input_text: &str, translation: &str, speech_url: Option<String>) -> Self {
        Self {
            input_text: input_text.to_string(),
            translation: translation.to_string(),
            speech_url,
            created_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        }
    }
}

/// History file shared by concurrent runs. Appends are serialized.
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory if needed.
    pub fn append(&self, record: &HistoryRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        Ok(())
    }

    /// Append and log instead of failing; history never fails a run.
    pub fn record(&self, record: &HistoryRecord) {
        if let Err(e) = self.append(record) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append history");
        }
    }
}
