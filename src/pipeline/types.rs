//! Data types for a single pipeline run.

use crate::audio::buffer::RawAudio;
use crate::audio::recorder::AudioSource;
use crate::error::{ErrorKind, Fault, PipelineError};
use crate::pipeline::latency::StageTimings;
use crate::stt::TranscriptResult;
use crate::translate::TranslationResult;
use crate::tts::SynthesisArtifact;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capturing,
    Normalizing,
    Transcribing,
    Translating,
    Synthesizing,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Capturing,
        Stage::Normalizing,
        Stage::Transcribing,
        Stage::Translating,
        Stage::Synthesizing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Capturing => "capturing",
            Stage::Normalizing => "normalizing",
            Stage::Transcribing => "transcribing",
            Stage::Translating => "translating",
            Stage::Synthesizing => "synthesizing",
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Capturing => Some(Stage::Normalizing),
            Stage::Normalizing => Some(Stage::Transcribing),
            Stage::Transcribing => Some(Stage::Translating),
            Stage::Translating => Some(Stage::Synthesizing),
            Stage::Synthesizing => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Stage),
    Done,
    Failed(Stage),
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

/// Audio handed to a pipeline run.
pub enum AudioInput {
    /// Already decoded interleaved samples.
    Samples(RawAudio),
    /// Container bytes, spooled to a temporary file for the run.
    Bytes {
        data: Vec<u8>,
        /// File extension hint such as "wav"
        hint: Option<String>,
    },
    /// Audio file on disk. Left in place.
    File(PathBuf),
    /// Record from a live source for a fixed duration.
    Capture(Box<dyn AudioSource>, Duration),
}

impl AudioInput {
    pub fn bytes(data: Vec<u8>, hint: Option<&str>) -> Self {
        AudioInput::Bytes {
            data,
            hint: hint.map(str::to_string),
        }
    }

    /// Size of in-memory input, checked against the upload limit.
    pub fn payload_len(&self) -> Option<usize> {
        match self {
            AudioInput::Bytes { data, .. } => Some(data.len()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioInput::Samples(raw) => f
                .debug_struct("Samples")
                .field("frames", &raw.frames())
                .field("sample_rate", &raw.sample_rate)
                .field("channels", &raw.channels)
                .finish(),
            AudioInput::Bytes { data, hint } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("hint", hint)
                .finish(),
            AudioInput::File(path) => f.debug_tuple("File").field(path).finish(),
            AudioInput::Capture(_, duration) => {
                f.debug_tuple("Capture").field(duration).finish()
            }
        }
    }
}

/// Error raised by one stage of a run.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: PipelineError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn fault(&self) -> Fault {
        self.error.fault()
    }

    pub fn into_error(self) -> PipelineError {
        self.error
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// Serialized with the caller-safe message only.
impl Serialize for StageFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("StageFailure", 4)?;
        state.serialize_field("stage", &self.stage)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("fault", &self.fault())?;
        state.serialize_field("message", &self.error.public_message())?;
        state.end()
    }
}

/// Everything a run produced, including partial results before a failure.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: RunState,
    pub transcript: Option<TranscriptResult>,
    pub translation: Option<TranslationResult>,
    pub synthesis: Option<SynthesisArtifact>,
    /// A synthesis backend error does not fail the run; it is kept here.
    /// A cancel during synthesis fails the run instead.
    pub synthesis_error: Option<StageFailure>,
    pub failure: Option<StageFailure>,
    pub timings: StageTimings,
    /// Duration of the normalized audio
    pub audio_duration: Option<Duration>,
}

impl PipelineOutcome {
    pub(crate) fn new() -> Self {
        Self {
            state: RunState::Idle,
            transcript: None,
            translation: None,
            synthesis: None,
            synthesis_error: None,
            failure: None,
            timings: StageTimings::new(),
            audio_duration: None,
        }
    }

    /// Translation produced without a run failure.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.translation.is_some()
    }

    /// Translated but speech synthesis failed.
    pub fn is_partial(&self) -> bool {
        self.is_success() && self.synthesis_error.is_some()
    }

    /// Last stage whose result is present.
    pub fn completed_through(&self) -> Option<Stage> {
        if self.synthesis.is_some() {
            Some(Stage::Synthesizing)
        } else if self.translation.is_some() {
            Some(Stage::Translating)
        } else if self.transcript.is_some() {
            Some(Stage::Transcribing)
        } else if self.audio_duration.is_some() {
            Some(Stage::Normalizing)
        } else {
            None
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.failure.as_ref().map(|f| f.stage)
    }
}
