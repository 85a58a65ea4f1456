//! Speech through the host audio output via `espeak-ng`.

use crate::error::{PipelineError, Result};
use crate::tts::executor::{CommandExecutor, SystemCommandExecutor};
use crate::tts::synthesizer::{SynthesisArtifact, Synthesizer, VoiceConfig, require_text};

pub const DEFAULT_PROGRAM: &str = "espeak-ng";

/// Local speech engine. Blocks until the utterance has been spoken.
pub struct LocalSynthesizer<E: CommandExecutor = SystemCommandExecutor> {
    executor: E,
    program: String,
}

impl LocalSynthesizer<SystemCommandExecutor> {
    pub fn system() -> Self {
        Self::new(SystemCommandExecutor::new())
    }
}

impl<E: CommandExecutor> LocalSynthesizer<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            program: DEFAULT_PROGRAM.to_string(),
        }
    }

    /// Use another espeak-compatible binary.
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }
}

/// Command line for one utterance.
///
/// espeak amplitude runs 0..=200 with 100 as normal loudness; volume 1.0
/// maps to 100.
pub fn espeak_args(text: &str, voice: &VoiceConfig) -> Vec<String> {
    let amplitude = (voice.volume.clamp(0.0, 2.0) * 100.0).round() as u32;
    vec![
        "-v".to_string(),
        voice.language.clone(),
        "-s".to_string(),
        voice.rate_wpm.to_string(),
        "-a".to_string(),
        amplitude.to_string(),
        "--".to_string(),
        text.to_string(),
    ]
}

impl<E: CommandExecutor> Synthesizer for LocalSynthesizer<E> {
    fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<SynthesisArtifact> {
        let text = require_text(text)?;
        let args = espeak_args(text, voice);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        self.executor
            .execute(&self.program, &arg_refs)
            .map_err(|e| match e {
                PipelineError::ToolNotFound { tool } => PipelineError::SynthesisFailure {
                    message: format!(
                        "{} not found. Install it:\n\
                         Ubuntu/Debian: sudo apt install espeak-ng\n\
                         Arch: sudo pacman -S espeak-ng",
                        tool
                    ),
                },
                other => PipelineError::SynthesisFailure {
                    message: other.to_string(),
                },
            })?;

        tracing::debug!(chars = text.chars().count(), "spoke text locally");
        Ok(SynthesisArtifact::played())
    }

    fn engine_name(&self) -> &str {
        "local"
    }
}
