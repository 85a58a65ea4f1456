//! vitrans - Vietnamese to English speech translation
//!
//! Speech in, English text and speech out: normalize, transcribe with
//! Whisper, translate with Marian, synthesize locally or through a cloud
//! engine. Driven from the CLI or the HTTP API.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod history;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod stt;
pub mod translate;
pub mod tts;

// Core traits (audio → text → text → speech)
pub use audio::recorder::AudioSource;
pub use stt::transcriber::Transcriber;
pub use translate::translator::Translator;
pub use tts::synthesizer::Synthesizer;

// Pipeline
pub use pipeline::{AudioInput, CancelToken, Pipeline, PipelineConfig, PipelineOutcome, Stage};

// Error handling
pub use error::{Fault, PipelineError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
