//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! The device is opened at its native configuration; downmixing and
//! resampling happen later in the normalizer, where the sinc filter gives a
//! cleaner result than anything cheap enough to run in the audio callback.

use crate::audio::recorder::AudioSource;
use crate::error::{PipelineError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probes ALSA, JACK and PipeWire backends on enumeration and each of
/// them prints harmless complaints to fd 2.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

fn capture_error(context: &str, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::AudioCapture {
        message: format!("{}: {}", context, e),
    }
}

/// List input device names.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect::<Vec<_>>())
    });
    devices.map_err(|e| capture_error("Failed to enumerate input devices", e))
}

fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| capture_error("Failed to enumerate input devices", e))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| PipelineError::AudioCapture {
                    message: format!("input device not found: {}", name),
                }),
            None => host
                .default_input_device()
                .ok_or_else(|| PipelineError::AudioCapture {
                    message: "no default input device".to_string(),
                }),
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in CpalAudioSource,
/// and start/stop are called synchronously from the owning thread.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone source delivering interleaved i16 at the device's native format.
pub struct CpalAudioSource {
    device: cpal::Device,
    config: cpal::SupportedStreamConfig,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
}

impl CpalAudioSource {
    /// Open `device_name`, or the system default input when `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_device(device_name)?;
        let config = device
            .default_input_config()
            .map_err(|e| capture_error("Failed to query default input config", e))?;

        tracing::info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate().0,
            channels = config.channels(),
            format = ?config.sample_format(),
            "opened input device"
        );

        Ok(Self {
            device,
            config,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let stream_config: cpal::StreamConfig = self.config.clone().into();
        let err_callback = |err| {
            tracing::warn!(error = %err, "audio stream error");
        };
        let buffer = Arc::clone(&self.buffer);

        match self.config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(data);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| capture_error("Failed to build i16 stream", e)),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend(
                                data.iter()
                                    .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                            );
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| capture_error("Failed to build f32 stream", e)),
            fmt => Err(PipelineError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. Try another device.",
                    fmt
                ),
            }),
        }
    }
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|e| capture_error("Failed to lock stream", e))?;
        if guard.is_some() {
            return Ok(());
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| capture_error("Failed to start audio stream", e))?;
        *guard = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut guard = self
            .stream
            .lock()
            .map_err(|e| capture_error("Failed to lock stream", e))?;
        if let Some(stream) = guard.take() {
            stream
                .0
                .pause()
                .map_err(|e| capture_error("Failed to stop audio stream", e))?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|e| capture_error("Failed to lock audio buffer", e))?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn channels(&self) -> u16 {
        self.config.channels()
    }
}
