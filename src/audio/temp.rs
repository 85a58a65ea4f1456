//! Per-run temporary audio files.
//!
//! Uploaded bytes are spooled into a [`TempAudioFile`] for the duration of
//! one pipeline run. The file is removed when the guard drops, whichever way
//! the run exits.

use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::{Builder, TempPath};

const PREFIX: &str = "vitrans-";

pub struct TempAudioFile {
    path: TempPath,
}

impl TempAudioFile {
    /// Create a file in `dir` holding `data` verbatim.
    pub fn with_bytes(dir: &Path, suffix: &str, data: &[u8]) -> Result<Self> {
        let mut file = Builder::new().prefix(PREFIX).suffix(suffix).tempfile_in(dir)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now and report failures instead of swallowing them.
    pub fn close(self) -> Result<()> {
        self.path.close()?;
        Ok(())
    }
}

impl std::fmt::Debug for TempAudioFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempAudioFile")
            .field("path", &self.path())
            .finish()
    }
}
