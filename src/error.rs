//! Error types for vitrans.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    // Input validation errors
    #[error("Unsupported audio format: {message}")]
    UnsupportedFormat { message: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    #[error("Input text is empty")]
    EmptyInput,

    #[error("Payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Input is {tokens} tokens, limit is {limit}")]
    SequenceTooLong { tokens: usize, limit: usize },

    // Stage failures
    #[error("Transcription failed: {message}")]
    TranscriptionFailure { message: String },

    #[error("Translation failed: {message}")]
    TranslationFailure { message: String },

    #[error("Speech synthesis failed: {message}")]
    SynthesisFailure { message: String },

    #[error("Pipeline timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Pipeline run was cancelled")]
    Cancelled,

    // Startup errors
    #[error("Failed to initialize {model} model: {message}")]
    ModelInitializationFailure { model: String, message: String },

    // Audio capture errors
    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // External tools
    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Who is to blame for an error, as seen from a request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The input was rejected; retrying the same request will fail again.
    Client,
    /// Something broke on our side.
    Server,
    /// The run exceeded its wall-clock budget.
    Timeout,
    /// The run was stopped before it finished; the input may be fine.
    Cancelled,
}

/// Payload-free discriminant of [`PipelineError`], safe to log and serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    EmptyAudio,
    EmptyInput,
    PayloadTooLarge,
    SequenceTooLong,
    TranscriptionFailure,
    TranslationFailure,
    SynthesisFailure,
    Timeout,
    Cancelled,
    ModelInitializationFailure,
    AudioCapture,
    ToolNotFound,
    CommandFailed,
    Config,
    Io,
}

impl ErrorKind {
    pub fn fault(self) -> Fault {
        match self {
            ErrorKind::UnsupportedFormat
            | ErrorKind::EmptyAudio
            | ErrorKind::EmptyInput
            | ErrorKind::PayloadTooLarge
            | ErrorKind::SequenceTooLong => Fault::Client,
            ErrorKind::Timeout => Fault::Timeout,
            ErrorKind::Cancelled => Fault::Cancelled,
            _ => Fault::Server,
        }
    }

    /// Message shown to remote callers for server-side faults.
    fn redacted_message(self) -> &'static str {
        match self {
            ErrorKind::TranscriptionFailure => "transcription failed",
            ErrorKind::TranslationFailure => "translation failed",
            ErrorKind::SynthesisFailure => "speech synthesis failed",
            _ => "internal server error",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            PipelineError::EmptyAudio => ErrorKind::EmptyAudio,
            PipelineError::EmptyInput => ErrorKind::EmptyInput,
            PipelineError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            PipelineError::SequenceTooLong { .. } => ErrorKind::SequenceTooLong,
            PipelineError::TranscriptionFailure { .. } => ErrorKind::TranscriptionFailure,
            PipelineError::TranslationFailure { .. } => ErrorKind::TranslationFailure,
            PipelineError::SynthesisFailure { .. } => ErrorKind::SynthesisFailure,
            PipelineError::Timeout { .. } => ErrorKind::Timeout,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::ModelInitializationFailure { .. } => {
                ErrorKind::ModelInitializationFailure
            }
            PipelineError::AudioCapture { .. } => ErrorKind::AudioCapture,
            PipelineError::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            PipelineError::CommandFailed { .. } => ErrorKind::CommandFailed,
            PipelineError::ConfigInvalidValue { .. } | PipelineError::Config(_) => {
                ErrorKind::Config
            }
            PipelineError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn fault(&self) -> Fault {
        self.kind().fault()
    }

    /// Errors that must abort the process instead of failing a single run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ModelInitializationFailure { .. })
    }

    /// Message safe to hand to a remote caller.
    ///
    /// Client, timeout and cancel errors describe the caller's own request,
    /// so they are returned verbatim. Server errors may carry paths or library internals
    /// and collapse to a fixed message per kind.
    pub fn public_message(&self) -> String {
        match self.fault() {
            Fault::Client | Fault::Timeout | Fault::Cancelled => self.to_string(),
            Fault::Server => self.kind().redacted_message().to_string(),
        }
    }
}
