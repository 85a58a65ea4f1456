//! Runs audio through transcription, translation and optional synthesis.
//!
//! A run is sequential and blocking. Concurrent runs share one
//! [`Pipeline`] from separate threads; the model handles serialize their
//! own inference.

use crate::audio::normalizer::AudioNormalizer;
use crate::audio::recorder::record_for;
use crate::audio::temp::TempAudioFile;
use crate::audio::{AudioBuffer, RawAudio};
use crate::config::Config;
use crate::defaults;
use crate::error::{Fault, PipelineError, Result};
use crate::models::ModelRegistry;
use crate::pipeline::latency::format_duration;
use crate::pipeline::types::{AudioInput, PipelineOutcome, RunState, Stage, StageFailure};
use crate::stt::TranscriptResult;
use crate::translate::TranslationResult;
use crate::tts::{SynthesisArtifact, Synthesizer, VoiceConfig};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run the synthesis stage after translation
    pub synthesize: bool,
    pub voice: VoiceConfig,
    /// Wall-clock budget for a whole run
    pub timeout: Duration,
    /// Where uploaded bytes are spooled
    pub temp_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            synthesize: true,
            voice: VoiceConfig::default(),
            timeout: Duration::from_secs(defaults::PIPELINE_TIMEOUT_SECS),
            temp_dir: std::env::temp_dir(),
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            synthesize: config.pipeline.synthesize,
            voice: config.tts.voice(),
            timeout: config.pipeline.timeout()?,
            temp_dir: config
                .audio
                .temp_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: config.audio.max_upload_bytes,
        })
    }
}

/// Cooperative cancellation flag, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Speech-to-speech translation pipeline over shared model handles.
pub struct Pipeline {
    registry: Arc<ModelRegistry>,
    synthesizer: Arc<dyn Synthesizer>,
    normalizer: AudioNormalizer,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registry", &self.registry)
            .field("synthesizer", &self.synthesizer.engine_name())
            .field("config", &self.config)
            .finish()
    }
}

/// Bookkeeping for one run: deadline, cancellation, state and timings.
struct Run<'a> {
    cancel: &'a CancelToken,
    started: Instant,
    timeout: Duration,
    outcome: PipelineOutcome,
}

impl<'a> Run<'a> {
    fn new(cancel: &'a CancelToken, timeout: Duration) -> Self {
        Self {
            cancel,
            started: Instant::now(),
            timeout,
            outcome: PipelineOutcome::new(),
        }
    }

    fn check_boundary(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let elapsed = self.started.elapsed();
        if elapsed >= self.timeout {
            return Err(PipelineError::Timeout {
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Run one stage: boundary checks, panic isolation, timing.
    fn stage<T>(&mut self, stage: Stage, work: impl FnOnce() -> Result<T>) -> Result<T> {
        self.stage_or_discard(stage, work, drop)
    }

    /// Like [`Run::stage`], but a value finished past the deadline or after a
    /// cancel goes to `discard` instead of being dropped.
    fn stage_or_discard<T>(
        &mut self,
        stage: Stage,
        work: impl FnOnce() -> Result<T>,
        discard: impl FnOnce(T),
    ) -> Result<T> {
        self.check_boundary()?;
        self.outcome.state = RunState::Running(stage);

        let span = tracing::info_span!("stage", stage = stage.as_str());
        let _enter = span.enter();
        let started = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(work))
            .unwrap_or_else(|payload| Err(panic_error(stage, payload.as_ref())));

        let elapsed = started.elapsed();
        self.outcome.timings.record(stage, elapsed);
        tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, ok = result.is_ok(), "stage finished");

        let value = result?;
        // A stage that ran past the deadline is reported as the one that timed out.
        if let Err(e) = self.check_boundary() {
            discard(value);
            return Err(e);
        }
        Ok(value)
    }

    fn fail(&mut self, stage: Stage, error: PipelineError) {
        match error.fault() {
            Fault::Server => {
                tracing::error!(stage = stage.as_str(), error = %error, "pipeline stage failed")
            }
            _ => tracing::warn!(stage = stage.as_str(), error = %error, "pipeline stage failed"),
        }
        self.outcome.state = RunState::Failed(stage);
        self.outcome.failure = Some(StageFailure::new(stage, error));
    }

    fn finish(mut self) -> PipelineOutcome {
        if self.outcome.failure.is_none() {
            self.outcome.state = RunState::Done;
        }
        tracing::info!(
            state = ?self.outcome.state,
            audio_ms = self.outcome.audio_duration.map(|d| d.as_millis() as u64),
            elapsed = %format_duration(self.started.elapsed()),
            stages = %self.outcome.timings.summary(),
            "pipeline run finished"
        );
        self.outcome
    }
}

fn panic_error(stage: Stage, payload: &(dyn std::any::Any + Send)) -> PipelineError {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic");
    let message = format!("engine panicked: {}", detail);
    match stage {
        Stage::Capturing => PipelineError::AudioCapture { message },
        Stage::Transcribing => PipelineError::TranscriptionFailure { message },
        Stage::Translating => PipelineError::TranslationFailure { message },
        Stage::Synthesizing => PipelineError::SynthesisFailure { message },
        Stage::Normalizing => PipelineError::Io(std::io::Error::other(message)),
    }
}

fn discard_artifact(artifact: SynthesisArtifact) {
    if let Err(e) = artifact.discard() {
        tracing::warn!(error = %e, "failed to remove late speech file");
    }
}

fn spool_suffix(hint: Option<&str>) -> String {
    match hint {
        Some(ext) if !ext.is_empty() => format!(".{}", ext.trim_start_matches('.')),
        _ => String::new(),
    }
}

impl Pipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        synthesizer: Arc<dyn Synthesizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            synthesizer,
            normalizer: AudioNormalizer::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Full run: audio through translation, then speech when enabled.
    pub fn run(&self, input: AudioInput) -> PipelineOutcome {
        self.run_with_cancel(input, &CancelToken::new())
    }

    pub fn run_with_cancel(&self, input: AudioInput, cancel: &CancelToken) -> PipelineOutcome {
        let last = if self.config.synthesize {
            Stage::Synthesizing
        } else {
            Stage::Translating
        };
        self.run_until(input, cancel, last)
    }

    /// Transcribe only, without translating.
    pub fn transcribe_only(&self, input: AudioInput) -> Result<TranscriptResult> {
        let outcome = self.run_until(input, &CancelToken::new(), Stage::Transcribing);
        match (outcome.failure, outcome.transcript) {
            (Some(failure), _) => Err(failure.into_error()),
            (None, Some(transcript)) => Ok(transcript),
            (None, None) => Err(PipelineError::TranscriptionFailure {
                message: "no transcript produced".to_string(),
            }),
        }
    }

    /// Translate text that did not come from audio.
    pub fn translate_text(&self, text: &str) -> Result<TranslationResult> {
        let cancel = CancelToken::new();
        let mut run = Run::new(&cancel, self.config.timeout);
        let translator = self.registry.translator();
        run.stage(Stage::Translating, || translator.translate(text))
    }

    /// Synthesize text with the configured voice.
    pub fn synthesize_text(&self, text: &str) -> Result<SynthesisArtifact> {
        let cancel = CancelToken::new();
        let mut run = Run::new(&cancel, self.config.timeout);
        run.stage_or_discard(
            Stage::Synthesizing,
            || self.synthesizer.synthesize(text, &self.config.voice),
            discard_artifact,
        )
    }

    /// Run stages up to and including `last`.
    ///
    /// `last` is one of `Transcribing`, `Translating` or `Synthesizing`.
    pub fn run_until(
        &self,
        input: AudioInput,
        cancel: &CancelToken,
        last: Stage,
    ) -> PipelineOutcome {
        let mut run = Run::new(cancel, self.config.timeout);
        tracing::debug!(input = ?input, through = last.as_str(), "pipeline run started");

        if let Some(len) = input.payload_len()
            && len > self.config.max_upload_bytes
        {
            run.fail(
                Stage::Capturing,
                PipelineError::PayloadTooLarge {
                    size: len,
                    limit: self.config.max_upload_bytes,
                },
            );
            return run.finish();
        }

        // Spooled uploads live until the end of this function on every path.
        let mut spool: Option<TempAudioFile> = None;

        let buffer = match self.acquire(&mut run, input, &mut spool) {
            Ok(buffer) => buffer,
            Err((stage, e)) => {
                run.fail(stage, e);
                return run.finish();
            }
        };
        run.outcome.audio_duration = Some(buffer.duration());

        let transcriber = self.registry.transcriber();
        let transcript = match run.stage(Stage::Transcribing, || transcriber.transcribe(&buffer)) {
            Ok(transcript) => transcript,
            Err(e) => {
                run.fail(Stage::Transcribing, e);
                return run.finish();
            }
        };
        drop(buffer);
        if let Some(file) = spool.take()
            && let Err(e) = file.close()
        {
            tracing::warn!(error = %e, "failed to remove spooled audio");
        }
        tracing::debug!(text = %transcript.text, "transcript");
        run.outcome.transcript = Some(transcript.clone());
        if last == Stage::Transcribing {
            return run.finish();
        }

        let translator = self.registry.translator();
        let translation = match run.stage(Stage::Translating, || {
            translator.translate(&transcript.text)
        }) {
            Ok(translation) => translation,
            Err(e) => {
                run.fail(Stage::Translating, e);
                return run.finish();
            }
        };
        tracing::debug!(text = %translation.translated_text, "translation");
        run.outcome.translation = Some(translation.clone());
        if last == Stage::Translating {
            return run.finish();
        }

        match run.stage_or_discard(
            Stage::Synthesizing,
            || {
                self.synthesizer
                    .synthesize(&translation.translated_text, &self.config.voice)
            },
            discard_artifact,
        ) {
            Ok(artifact) => run.outcome.synthesis = Some(artifact),
            Err(e @ PipelineError::Cancelled) => run.fail(Stage::Synthesizing, e),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, keeping translation");
                run.outcome.synthesis_error = Some(StageFailure::new(Stage::Synthesizing, e));
            }
        }
        run.finish()
    }

    /// Capturing and normalizing: any input to a canonical buffer.
    fn acquire(
        &self,
        run: &mut Run<'_>,
        input: AudioInput,
        spool: &mut Option<TempAudioFile>,
    ) -> std::result::Result<AudioBuffer, (Stage, PipelineError)> {
        let at = |stage: Stage| move |e: PipelineError| (stage, e);

        match input {
            AudioInput::Samples(raw) => self.normalize_raw(run, &raw),
            AudioInput::Capture(mut source, duration) => {
                let raw = run
                    .stage(Stage::Capturing, || record_for(source.as_mut(), duration))
                    .map_err(at(Stage::Capturing))?;
                self.normalize_raw(run, &raw)
            }
            AudioInput::Bytes { data, hint } => {
                let suffix = spool_suffix(hint.as_deref());
                let file = run
                    .stage(Stage::Capturing, || {
                        TempAudioFile::with_bytes(&self.config.temp_dir, &suffix, &data)
                    })
                    .map_err(at(Stage::Capturing))?;
                drop(data);
                let path = file.path().to_path_buf();
                *spool = Some(file);
                run.stage(Stage::Normalizing, || self.normalizer.normalize_file(&path))
                    .map_err(at(Stage::Normalizing))
            }
            AudioInput::File(path) => run
                .stage(Stage::Normalizing, || self.normalizer.normalize_file(&path))
                .map_err(at(Stage::Normalizing)),
        }
    }

    fn normalize_raw(
        &self,
        run: &mut Run<'_>,
        raw: &RawAudio,
    ) -> std::result::Result<AudioBuffer, (Stage, PipelineError)> {
        run.stage(Stage::Normalizing, || self.normalizer.normalize(raw))
            .map_err(|e| (Stage::Normalizing, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockAudioSource;
    use crate::error::ErrorKind;
    use crate::stt::MockTranscriber;
    use crate::translate::MockTranslator;
    use crate::tts::MockSynthesizer;

    fn speech_samples() -> RawAudio {
        let samples: Vec<f32> = (0..16000)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();
        RawAudio::new(samples, 16000, 1)
    }

    fn wav_bytes(rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    fn pipeline_with(
        transcriber: MockTranscriber,
        translator: MockTranslator,
        synthesizer: MockSynthesizer,
        config: PipelineConfig,
    ) -> Pipeline {
        let registry = ModelRegistry::from_parts(Arc::new(transcriber), Arc::new(translator));
        Pipeline::new(Arc::new(registry), Arc::new(synthesizer), config)
    }

    fn default_pipeline() -> Pipeline {
        pipeline_with(
            MockTranscriber::new("mock").with_response("xin chào"),
            MockTranslator::new().with_phrase("xin chào", "hello"),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn test_full_run_produces_every_result() {
        let pipeline = default_pipeline();
        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        assert_eq!(outcome.state, RunState::Done);
        assert!(outcome.is_success());
        assert!(!outcome.is_partial());
        assert_eq!(outcome.transcript.unwrap().text, "xin chào");
        assert_eq!(outcome.translation.unwrap().translated_text, "hello");
        assert!(outcome.synthesis.is_some());
        assert_eq!(outcome.audio_duration, Some(Duration::from_secs(1)));
        for stage in [
            Stage::Normalizing,
            Stage::Transcribing,
            Stage::Translating,
            Stage::Synthesizing,
        ] {
            assert!(outcome.timings.get(stage).is_some(), "missing {}", stage);
        }
        assert!(outcome.timings.get(Stage::Capturing).is_none());
    }

    #[test]
    fn test_synthesis_disabled_stops_after_translation() {
        let synth = MockSynthesizer::new();
        let config = PipelineConfig {
            synthesize: false,
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(
            MockTranscriber::new("mock"),
            MockTranslator::new(),
            synth.clone(),
            config,
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        assert!(outcome.is_success());
        assert!(outcome.synthesis.is_none());
        assert_eq!(synth.call_count(), 0);
    }

    #[test]
    fn test_transcription_failure_halts_before_translation() {
        let translator = MockTranslator::new();
        let pipeline = pipeline_with(
            MockTranscriber::new("mock").with_failure("decoder exploded"),
            translator.clone(),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        assert_eq!(outcome.state, RunState::Failed(Stage::Transcribing));
        assert_eq!(outcome.failed_stage(), Some(Stage::Transcribing));
        assert!(outcome.transcript.is_none());
        assert_eq!(translator.call_count(), 0);
    }

    #[test]
    fn test_empty_transcript_fails_at_translation() {
        let pipeline = pipeline_with(
            MockTranscriber::new("mock").with_response(""),
            MockTranslator::new(),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Translating);
        assert_eq!(failure.kind(), ErrorKind::EmptyInput);
        assert_eq!(outcome.transcript.as_ref().unwrap().text, "");
    }

    #[test]
    fn test_synthesis_failure_is_partial_success() {
        let pipeline = pipeline_with(
            MockTranscriber::new("mock"),
            MockTranslator::new(),
            MockSynthesizer::new().with_failure("endpoint offline"),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        assert_eq!(outcome.state, RunState::Done);
        assert!(outcome.is_partial());
        assert!(outcome.translation.is_some());
        assert_eq!(
            outcome.synthesis_error.as_ref().map(|f| f.kind()),
            Some(ErrorKind::SynthesisFailure)
        );
    }

    #[test]
    fn test_engine_panic_becomes_stage_failure() {
        let pipeline = pipeline_with(
            MockTranscriber::new("mock"),
            MockTranslator::new().with_panic(),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage, Stage::Translating);
        assert_eq!(failure.kind(), ErrorKind::TranslationFailure);
        assert!(outcome.transcript.is_some());
    }

    #[test]
    fn test_empty_audio_fails_at_normalizing() {
        let pipeline = default_pipeline();
        let outcome = pipeline.run(AudioInput::Samples(RawAudio::new(Vec::new(), 16000, 1)));

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage, Stage::Normalizing);
        assert_eq!(failure.kind(), ErrorKind::EmptyAudio);
        assert_eq!(failure.fault(), Fault::Client);
    }

    #[test]
    fn test_oversized_upload_rejected_before_work() {
        let transcriber = MockTranscriber::new("mock");
        let temp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            max_upload_bytes: 1000,
            temp_dir: temp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(
            transcriber.clone(),
            MockTranslator::new(),
            MockSynthesizer::new(),
            config,
        );

        let outcome = pipeline.run(AudioInput::bytes(vec![0u8; 1001], Some("wav")));

        assert!(matches!(
            outcome.failure.as_ref().map(|f| &f.error),
            Some(PipelineError::PayloadTooLarge {
                size: 1001,
                limit: 1000
            })
        ));
        assert_eq!(transcriber.call_count(), 0);
        assert!(outcome.timings.entries().is_empty());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_uploaded_bytes_are_spooled_and_removed() {
        let temp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            temp_dir: temp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let dir = temp.path().to_path_buf();
        let transcriber = MockTranscriber::new("mock").with_responder(move |_| {
            let spooled = std::fs::read_dir(&dir).unwrap().count();
            format!("spooled {}", spooled)
        });
        let pipeline = pipeline_with(
            transcriber,
            MockTranslator::new(),
            MockSynthesizer::new(),
            config,
        );

        let samples: Vec<i16> = (0..8000).map(|i| ((i % 100) as i16 - 50) * 100).collect();
        let outcome = pipeline.run(AudioInput::bytes(wav_bytes(8000, &samples), Some("wav")));

        assert!(outcome.is_success());
        assert_eq!(outcome.transcript.unwrap().text, "spooled 1");
        assert!(outcome.timings.get(Stage::Capturing).is_some());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_spool_removed_when_decoding_fails() {
        let temp = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            temp_dir: temp.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(
            MockTranscriber::new("mock"),
            MockTranslator::new(),
            MockSynthesizer::new(),
            config,
        );

        let outcome = pipeline.run(AudioInput::bytes(b"not audio at all".to_vec(), Some("wav")));

        assert_eq!(outcome.failed_stage(), Some(Stage::Normalizing));
        assert_eq!(
            outcome.failure.as_ref().map(|f| f.kind()),
            Some(ErrorKind::UnsupportedFormat)
        );
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_capture_input_is_recorded_and_normalized() {
        let source = MockAudioSource::new()
            .with_samples(vec![1000; 96000])
            .with_format(48000, 2);
        let pipeline = default_pipeline();

        let outcome = pipeline.run(AudioInput::Capture(
            Box::new(source),
            Duration::from_secs(1),
        ));

        assert!(outcome.is_success());
        assert!(outcome.timings.get(Stage::Capturing).is_some());
        let duration = outcome.audio_duration.unwrap();
        assert!((duration.as_secs_f64() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_capture_failure_reported_at_capturing() {
        let source = MockAudioSource::new().with_start_failure();
        let pipeline = default_pipeline();

        let outcome = pipeline.run(AudioInput::Capture(
            Box::new(source),
            Duration::from_millis(100),
        ));

        assert_eq!(outcome.failed_stage(), Some(Stage::Capturing));
        assert_eq!(outcome.completed_through(), None);
    }

    #[test]
    fn test_cancelled_run_does_no_work() {
        let transcriber = MockTranscriber::new("mock");
        let pipeline = pipeline_with(
            transcriber.clone(),
            MockTranslator::new(),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        );
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = pipeline.run_with_cancel(AudioInput::Samples(speech_samples()), &cancel);

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage, Stage::Normalizing);
        assert_eq!(failure.kind(), ErrorKind::Cancelled);
        assert_eq!(transcriber.call_count(), 0);
    }

    /// Writes a speech file, then cancels the run it belongs to.
    struct CancellingSynthesizer {
        cancel: CancelToken,
        dir: PathBuf,
    }

    impl Synthesizer for CancellingSynthesizer {
        fn synthesize(&self, _text: &str, _voice: &VoiceConfig) -> Result<SynthesisArtifact> {
            let path = self.dir.join("speech.mp3");
            std::fs::write(&path, b"ID3")?;
            self.cancel.cancel();
            Ok(SynthesisArtifact {
                location: crate::tts::ArtifactLocation::File(path),
                content_type: crate::tts::AudioContentType::Mpeg,
                access_locator: Some("http://localhost/media/tts/speech.mp3".to_string()),
            })
        }

        fn engine_name(&self) -> &str {
            "cancelling"
        }
    }

    #[test]
    fn test_cancel_during_synthesis_fails_run_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        let registry = ModelRegistry::from_parts(
            Arc::new(MockTranscriber::new("mock")),
            Arc::new(MockTranslator::new()),
        );
        let pipeline = Pipeline::new(
            Arc::new(registry),
            Arc::new(CancellingSynthesizer {
                cancel: cancel.clone(),
                dir: dir.path().to_path_buf(),
            }),
            PipelineConfig::default(),
        );

        let outcome = pipeline.run_with_cancel(AudioInput::Samples(speech_samples()), &cancel);

        assert_eq!(outcome.state, RunState::Failed(Stage::Synthesizing));
        assert_eq!(
            outcome.failure.as_ref().map(|f| f.kind()),
            Some(ErrorKind::Cancelled)
        );
        assert!(outcome.synthesis_error.is_none());
        assert!(outcome.synthesis.is_none());
        assert!(outcome.translation.is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_slow_stage_times_out_and_keeps_earlier_results() {
        let translator = MockTranslator::new();
        let config = PipelineConfig {
            timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        };
        let pipeline = pipeline_with(
            MockTranscriber::new("mock").with_delay(Duration::from_millis(120)),
            translator.clone(),
            MockSynthesizer::new(),
            config,
        );

        let outcome = pipeline.run(AudioInput::Samples(speech_samples()));

        let failure = outcome.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::Transcribing);
        assert_eq!(failure.fault(), Fault::Timeout);
        assert_eq!(outcome.completed_through(), Some(Stage::Normalizing));
        assert_eq!(translator.call_count(), 0);
    }

    #[test]
    fn test_transcribe_only_skips_translation() {
        let translator = MockTranslator::new();
        let pipeline = pipeline_with(
            MockTranscriber::new("mock").with_response("một hai ba"),
            translator.clone(),
            MockSynthesizer::new(),
            PipelineConfig::default(),
        );

        let transcript = pipeline
            .transcribe_only(AudioInput::Samples(speech_samples()))
            .unwrap();

        assert_eq!(transcript.text, "một hai ba");
        assert_eq!(translator.call_count(), 0);
    }

    #[test]
    fn test_transcribe_only_surfaces_error() {
        let pipeline = default_pipeline();
        let result = pipeline.transcribe_only(AudioInput::Samples(RawAudio::new(vec![], 8000, 1)));
        assert!(matches!(result, Err(PipelineError::EmptyAudio)));
    }

    #[test]
    fn test_translate_text_is_idempotent() {
        let pipeline = default_pipeline();
        let first = pipeline.translate_text("xin chào").unwrap();
        let second = pipeline.translate_text("xin chào").unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            pipeline.translate_text("   "),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn test_synthesize_text_uses_configured_engine() {
        let synth = MockSynthesizer::new();
        let pipeline = pipeline_with(
            MockTranscriber::new("mock"),
            MockTranslator::new(),
            synth.clone(),
            PipelineConfig::default(),
        );

        assert!(pipeline.synthesize_text("hello").is_ok());
        assert!(matches!(
            pipeline.synthesize_text(""),
            Err(PipelineError::EmptyInput)
        ));
        assert_eq!(synth.call_count(), 2);
    }

    #[test]
    fn test_config_from_file_settings() {
        let mut config = Config::default();
        config.pipeline.timeout = "45s".to_string();
        config.pipeline.synthesize = false;
        config.audio.max_upload_bytes = 2048;

        let pipeline_config = PipelineConfig::from_config(&config).unwrap();
        assert_eq!(pipeline_config.timeout, Duration::from_secs(45));
        assert!(!pipeline_config.synthesize);
        assert_eq!(pipeline_config.max_upload_bytes, 2048);

        config.pipeline.timeout = "later".to_string();
        assert!(PipelineConfig::from_config(&config).is_err());
    }

    #[test]
    fn test_spool_suffix() {
        assert_eq!(spool_suffix(Some("wav")), ".wav");
        assert_eq!(spool_suffix(Some(".mp3")), ".mp3");
        assert_eq!(spool_suffix(Some("")), "");
        assert_eq!(spool_suffix(None), "");
    }
}
