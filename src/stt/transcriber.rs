use crate::audio::buffer::AudioBuffer;
use crate::defaults;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Recognized speech for one audio buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptResult {
    pub text: String,
    pub language_tag: String,
}

impl TranscriptResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language_tag: defaults::SOURCE_LANGUAGE.to_string(),
        }
    }
}

/// Trait for speech-to-text transcription.
///
/// This trait allows swapping implementations (real Whisper vs mock).
/// Implementations are shared between worker threads and must serialize
/// access to any non-reentrant model state internally.
pub trait Transcriber: Send + Sync {
    /// Transcribe a canonical (16 kHz mono 16-bit) buffer.
    ///
    /// Non-canonical buffers are rejected with `TranscriptionFailure`;
    /// the engine never resamples on its own.
    fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptResult>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;
}

/// Implement Transcriber for Arc<T> to allow sharing across runs.
impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptResult> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Reject buffers the recognizer was not built for.
pub fn require_canonical(audio: &AudioBuffer) -> Result<()> {
    if audio.is_canonical() {
        return Ok(());
    }
    Err(PipelineError::TranscriptionFailure {
        message: format!(
            "expected {} Hz mono {}-bit audio, got {} Hz {} channel(s) {}-bit ({} samples)",
            defaults::SAMPLE_RATE,
            defaults::BIT_DEPTH,
            audio.sample_rate(),
            audio.channel_count(),
            audio.bit_depth(),
            audio.len()
        ),
    })
}

/// Remove decoder control tokens and non-speech annotations.
///
/// Whisper can emit `<|...|>` special tokens and bracketed tags such as
/// `[BLANK_AUDIO]` or `[MUSIC]`; neither is speech.
pub fn strip_control_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<|")
            && let Some(end) = after.find("|>")
        {
            rest = &after[end + 2..];
            continue;
        }
        if let Some(after) = rest.strip_prefix('[')
            && let Some(end) = after.find(']')
            && is_annotation(&after[..end])
        {
            rest = &after[end + 1..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_annotation(inner: &str) -> bool {
    !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_' || c == ' ')
}

type Responder = Arc<dyn Fn(&AudioBuffer) -> String + Send + Sync>;

/// Mock transcriber for testing
#[derive(Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    responder: Option<Responder>,
    failure: Option<String>,
    panics: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    /// Create a new mock transcriber with default settings
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "xin chào".to_string(),
            responder: None,
            failure: None,
            panics: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Derive the transcript from the audio itself.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&AudioBuffer) -> String + Send + Sync + 'static,
    ) -> Self {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Configure the mock to panic on transcribe
    pub fn with_panic(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of transcribe calls so far, across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTranscriber")
            .field("model_name", &self.model_name)
            .field("response", &self.response)
            .field("failure", &self.failure)
            .finish()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &AudioBuffer) -> Result<TranscriptResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        require_canonical(audio)?;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.panics {
            panic!("mock transcriber panic");
        }
        if let Some(message) = &self.failure {
            return Err(PipelineError::TranscriptionFailure {
                message: message.clone(),
            });
        }
        let text = match &self.responder {
            Some(responder) => responder(audio),
            None => self.response.clone(),
        };
        Ok(TranscriptResult::new(text))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
