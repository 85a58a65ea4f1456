//! In-memory audio containers.
//!
//! [`RawAudio`] is whatever a decoder or capture device produced.
//! [`AudioBuffer`] is what the recognizer consumes and can only be built in
//! the canonical format.

use crate::defaults::{BIT_DEPTH, CHANNELS, SAMPLE_RATE};
use crate::error::{PipelineError, Result};
use std::time::Duration;

/// Decoded interleaved samples at an arbitrary rate and channel count.
///
/// Samples are `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Wrap 16-bit PCM, scaling to `[-1.0, 1.0)`.
    pub fn from_i16(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.iter().map(|&s| s as f32 / 32768.0).collect(),
            sample_rate,
            channels,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Mono 16 kHz 16-bit PCM, ready for transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
    channel_count: u16,
    bit_depth: u16,
}

impl AudioBuffer {
    /// Build a canonical buffer. Empty input is rejected.
    pub fn canonical(samples: Vec<i16>) -> Result<Self> {
        if samples.is_empty() {
            return Err(PipelineError::EmptyAudio);
        }
        Ok(Self {
            samples,
            sample_rate: SAMPLE_RATE,
            channel_count: CHANNELS,
            bit_depth: BIT_DEPTH,
        })
    }

    /// Build a buffer with explicit format, canonical or not.
    ///
    /// Used by tests and by callers that need to hand a recognizer something
    /// it must reject.
    pub fn with_format(
        samples: Vec<i16>,
        sample_rate: u32,
        channel_count: u16,
        bit_depth: u16,
    ) -> Self {
        Self {
            samples,
            sample_rate,
            channel_count,
            bit_depth,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channel_count == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / self.channel_count as usize;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    pub fn is_canonical(&self) -> bool {
        self.sample_rate == SAMPLE_RATE
            && self.channel_count == CHANNELS
            && self.bit_depth == BIT_DEPTH
            && !self.samples.is_empty()
    }

    /// Samples scaled to `[-1.0, 1.0)` for model input.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| s as f32 / 32768.0).collect()
    }
}
