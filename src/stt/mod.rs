//! Speech recognition: canonical audio to Vietnamese text.

pub mod transcriber;
pub mod whisper;

pub use transcriber::{MockTranscriber, TranscriptResult, Transcriber};
pub use whisper::{WhisperConfig, WhisperTranscriber};
