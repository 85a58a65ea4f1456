//! Process-wide model handles.
//!
//! The entry point builds one [`ModelRegistry`] before accepting any work
//! and hands it out by `Arc`. Construction either yields fully loaded models
//! or a fatal [`PipelineError::ModelInitializationFailure`].

use crate::audio::AudioBuffer;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::stt::{TranscriptResult, Transcriber, WhisperTranscriber};
use crate::translate::{MarianTranslator, Translator};
use std::sync::Arc;
use std::time::Instant;

/// Read-only transcription and translation handles.
#[derive(Clone)]
pub struct ModelRegistry {
    transcriber: Arc<dyn Transcriber>,
    translator: Arc<dyn Translator>,
}

impl ModelRegistry {
    /// Load the speech and translation models named by `config`.
    pub fn load(config: &Config) -> Result<Self> {
        let started = Instant::now();
        let transcriber = WhisperTranscriber::new(config.stt.whisper_config())?;
        tracing::info!(
            model = transcriber.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcription model ready"
        );

        let translator = load_translator(config)?;
        Ok(Self::from_parts(Arc::new(transcriber), Arc::new(translator)))
    }

    /// Load only the translation model. Transcription through this registry
    /// fails with `TranscriptionFailure`.
    pub fn load_translation(config: &Config) -> Result<Self> {
        let translator = load_translator(config)?;
        Ok(Self::from_parts(Arc::new(UnloadedTranscriber), Arc::new(translator)))
    }

    /// Assemble a registry from already constructed engines.
    pub fn from_parts(transcriber: Arc<dyn Transcriber>, translator: Arc<dyn Translator>) -> Self {
        Self {
            transcriber,
            translator,
        }
    }

    pub fn transcriber(&self) -> &Arc<dyn Transcriber> {
        &self.transcriber
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }
}

fn load_translator(config: &Config) -> Result<MarianTranslator> {
    let started = Instant::now();
    let translator = MarianTranslator::load(config.translation.marian_config())?;
    tracing::info!(
        model = translator.model_name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "translation model ready"
    );
    Ok(translator)
}

/// Placeholder for a speech model that was never loaded.
#[derive(Debug)]
struct UnloadedTranscriber;

impl Transcriber for UnloadedTranscriber {
    fn transcribe(&self, _audio: &AudioBuffer) -> Result<TranscriptResult> {
        Err(PipelineError::TranscriptionFailure {
            message: "speech model not loaded".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("transcriber", &self.transcriber.model_name())
            .field("translator", &self.translator.model_name())
            .finish()
    }
}
