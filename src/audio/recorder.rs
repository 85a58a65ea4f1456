use crate::audio::buffer::RawAudio;
use crate::error::{PipelineError, Result};
use std::time::{Duration, Instant};

/// How long a recording may run past its target length while waiting for
/// the device to deliver the last frames.
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Trait for audio source devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// Sources deliver interleaved 16-bit PCM at their native format; the
/// normalizer converts it afterwards.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Drain whatever samples arrived since the last call.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Sample rate of the delivered samples.
    fn sample_rate(&self) -> u32;

    /// Interleaved channel count of the delivered samples.
    fn channels(&self) -> u16;
}

/// Record `duration` of audio from `source`.
///
/// The source is always stopped before returning, also on read errors.
pub fn record_for(source: &mut dyn AudioSource, duration: Duration) -> Result<RawAudio> {
    let rate = source.sample_rate();
    let channels = source.channels().max(1);
    let wanted = (duration.as_secs_f64() * rate as f64).round() as usize * channels as usize;

    source.start()?;
    let started = Instant::now();
    let deadline = started + duration + CAPTURE_GRACE;
    let mut samples: Vec<i16> = Vec::with_capacity(wanted);

    let read_result = loop {
        match source.read_samples() {
            Ok(chunk) if chunk.is_empty() => {
                if Instant::now() >= deadline {
                    break Ok(());
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(chunk) => {
                samples.extend_from_slice(&chunk);
                if samples.len() >= wanted {
                    break Ok(());
                }
            }
            Err(e) => break Err(e),
        }
    };
    let stop_result = source.stop();
    read_result?;
    stop_result?;

    samples.truncate(wanted);
    // Keep whole frames only.
    samples.truncate(samples.len() - samples.len() % channels as usize);

    tracing::debug!(
        samples = samples.len(),
        sample_rate = rate,
        channels,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "recording finished"
    );
    Ok(RawAudio::from_i16(&samples, rate, channels))
}

/// Mock audio source for testing
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    should_fail_start: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockAudioSource {
    /// Create a new mock audio source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            samples: vec![0i16; 160],
            sample_rate: 16000,
            channels: 1,
            should_fail_start: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to return specific samples on every read
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the reported device format
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the audio source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }

    fn failure(&self) -> PipelineError {
        PipelineError::AudioCapture {
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(self.failure());
        }
        self.is_started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.is_started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        if self.should_fail_read {
            return Err(self.failure());
        }
        Ok(self.samples.clone())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}
