//! Whisper-based speech-to-text transcription.
//!
//! Wraps a PhoWhisper/whisper.cpp ggml model via whisper-rs with the
//! language forced to Vietnamese.
//!
//! # Feature Gate
//!
//! Real inference requires the `whisper` feature (and cmake). Without it a
//! stub is compiled that validates the model path and fails every call.

use crate::audio::buffer::AudioBuffer;
use crate::defaults;
use crate::error::{PipelineError, Result};
use crate::stt::transcriber::{
    Transcriber, TranscriptResult, require_canonical, strip_control_tokens,
};
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Decoding parameters fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Forced language code
    pub language: String,
    /// 1 selects greedy decoding, larger values beam search
    pub beam_size: u32,
    /// Number of threads for inference (None = whisper.cpp default)
    pub threads: Option<usize>,
    pub use_gpu: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-phowhisper-small.bin"),
            language: defaults::SOURCE_LANGUAGE.to_string(),
            beam_size: defaults::BEAM_SIZE,
            threads: None,
            use_gpu: true,
        }
    }
}

fn model_name_from(config: &WhisperConfig) -> String {
    config
        .model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn check_model_file(config: &WhisperConfig) -> Result<()> {
    if config.model_path.is_file() {
        return Ok(());
    }
    Err(PipelineError::ModelInitializationFailure {
        model: "whisper".to_string(),
        message: format!("model file not found: {}", config.model_path.display()),
    })
}

/// Whisper-based transcriber implementation.
///
/// The WhisperContext is wrapped in a Mutex: one full decode at a time per
/// loaded model.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Whisper transcriber placeholder (without whisper feature).
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load the model. Failure here is fatal for the process.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // Route whisper.cpp logging away from stderr (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        check_model_file(&config)?;
        let model_name = model_name_from(&config);

        let init_error = |message: String| PipelineError::ModelInitializationFailure {
            model: "whisper".to_string(),
            message,
        };

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(config.use_gpu);
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| init_error("invalid UTF-8 in model path".to_string()))?;
        let context = WhisperContext::new_with_params(path, context_params)
            .map_err(|e| init_error(format!("failed to load model: {}", e)))?;

        tracing::info!(
            model = %model_name,
            language = %config.language,
            beam_size = config.beam_size,
            gpu = config.use_gpu,
            "whisper model loaded"
        );

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    fn sampling_strategy(&self) -> SamplingStrategy {
        if self.config.beam_size <= 1 {
            SamplingStrategy::Greedy { best_of: 1 }
        } else {
            SamplingStrategy::BeamSearch {
                beam_size: self.config.beam_size as i32,
                patience: -1.0,
            }
        }
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Validate the model path (stub implementation).
    pub fn new(config: WhisperConfig) -> Result<Self> {
        check_model_file(&config)?;
        let model_name = model_name_from(&config);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptResult> {
        require_canonical(audio)?;
        let audio_f32 = audio.to_f32();

        let failure = |message: String| PipelineError::TranscriptionFailure { message };

        let context = self
            .context
            .lock()
            .map_err(|e| failure(format!("failed to acquire context lock: {}", e)))?;

        let mut state = context
            .create_state()
            .map_err(|e| failure(format!("failed to create whisper state: {}", e)))?;

        let mut params = FullParams::new(self.sampling_strategy());
        params.set_language(Some(&self.config.language));
        params.set_translate(false);
        if let Some(threads) = self.config.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| failure(format!("whisper inference failed: {}", e)))?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }

        Ok(TranscriptResult {
            text: strip_control_tokens(&transcription),
            language_tag: self.config.language.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptResult> {
        require_canonical(audio)?;
        Err(PipelineError::TranscriptionFailure {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release (whisper is enabled by default)"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
