use crate::defaults;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Voice parameters for one synthesis call.
///
/// The cloud engine only honours `language`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub language: String,
    pub rate_wpm: u32,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: defaults::TARGET_LANGUAGE.to_string(),
            rate_wpm: defaults::TTS_RATE_WPM,
            volume: defaults::TTS_VOLUME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioContentType {
    #[serde(rename = "audio/mpeg")]
    Mpeg,
    #[serde(rename = "audio/wav")]
    Wav,
}

impl AudioContentType {
    pub fn mime(self) -> &'static str {
        match self {
            AudioContentType::Mpeg => "audio/mpeg",
            AudioContentType::Wav => "audio/wav",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioContentType::Mpeg => "mp3",
            AudioContentType::Wav => "wav",
        }
    }
}

/// Where synthesized audio ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// Spoken through the host audio output; nothing persisted.
    Played,
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// Result of a synthesis call. The caller owns any persisted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisArtifact {
    pub location: ArtifactLocation,
    pub content_type: AudioContentType,
    /// Public URL of a persisted file
    pub access_locator: Option<String>,
}

impl SynthesisArtifact {
    pub fn played() -> Self {
        Self {
            location: ArtifactLocation::Played,
            content_type: AudioContentType::Wav,
            access_locator: None,
        }
    }

    /// Remove a persisted file that will never be handed to a caller.
    pub fn discard(self) -> Result<()> {
        if let ArtifactLocation::File(path) = &self.location {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "discarded speech file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Trait for text-to-speech engines.
pub trait Synthesizer: Send + Sync {
    /// Speak or render `text`. Empty text fails with `EmptyInput`.
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisArtifact>;

    fn engine_name(&self) -> &str;
}

impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisArtifact> {
        (**self).synthesize(text, voice)
    }

    fn engine_name(&self) -> &str {
        (**self).engine_name()
    }
}

pub(crate) fn require_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(trimmed)
}

/// Mock synthesizer for testing
#[derive(Debug, Clone, Default)]
pub struct MockSynthesizer {
    artifact: Option<SynthesisArtifact>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `artifact` instead of a played result.
    pub fn with_artifact(mut self, artifact: SynthesisArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Configure the mock to fail on synthesize
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Synthesizer for MockSynthesizer {
    fn synthesize(&self, text: &str, _voice: &VoiceConfig) -> Result<SynthesisArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        require_text(text)?;
        if let Some(message) = &self.failure {
            return Err(PipelineError::SynthesisFailure {
                message: message.clone(),
            });
        }
        Ok(self
            .artifact
            .clone()
            .unwrap_or_else(SynthesisArtifact::played))
    }

    fn engine_name(&self) -> &str {
        "mock"
    }
}
