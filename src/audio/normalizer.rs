//! Conversion of arbitrary audio into the canonical recognizer format.
//!
//! PCM and float WAV is read with hound. Other WAV encodings (A-law, μ-law,
//! ADPCM) and every other container go through the symphonia probe. Multi-channel audio is averaged down to mono and other
//! rates are resampled with a windowed-sinc filter.

use crate::audio::buffer::{AudioBuffer, RawAudio};
use crate::defaults::SAMPLE_RATE;
use crate::error::{PipelineError, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const RESAMPLE_CHUNK: usize = 1024;

/// Stateless converter to mono 16 kHz 16-bit PCM.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioNormalizer;

impl AudioNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize already-decoded interleaved samples.
    pub fn normalize(&self, raw: &RawAudio) -> Result<AudioBuffer> {
        if raw.sample_rate == 0 {
            return Err(PipelineError::UnsupportedFormat {
                message: "sample rate is zero".to_string(),
            });
        }
        if raw.channels == 0 {
            return Err(PipelineError::UnsupportedFormat {
                message: "channel count is zero".to_string(),
            });
        }
        if raw.frames() == 0 {
            return Err(PipelineError::EmptyAudio);
        }

        let mono = downmix(&raw.samples, raw.channels);
        let resampled = if raw.sample_rate == SAMPLE_RATE {
            mono
        } else {
            resample(&mono, raw.sample_rate, SAMPLE_RATE)?
        };

        let buffer = AudioBuffer::canonical(resampled.iter().map(|&s| to_i16(s)).collect())?;
        tracing::debug!(
            source_rate = raw.sample_rate,
            source_channels = raw.channels,
            samples = buffer.len(),
            duration_ms = buffer.duration().as_millis() as u64,
            "audio normalized"
        );
        Ok(buffer)
    }

    /// Decode container bytes and normalize them.
    ///
    /// `hint` is a file extension such as `"wav"` or `"mp3"`; it only helps
    /// the probe and may be wrong or absent.
    pub fn normalize_bytes(&self, data: &[u8], hint: Option<&str>) -> Result<AudioBuffer> {
        let raw = decode(data, hint)?;
        self.normalize(&raw)
    }

    /// Read a file from disk and normalize it.
    pub fn normalize_file(&self, path: &Path) -> Result<AudioBuffer> {
        let data = std::fs::read(path)?;
        let hint = path.extension().and_then(|e| e.to_str());
        self.normalize_bytes(&data, hint)
    }
}

/// Decode container bytes to interleaved `f32` samples.
pub fn decode(data: &[u8], hint: Option<&str>) -> Result<RawAudio> {
    if data.is_empty() {
        return Err(PipelineError::EmptyAudio);
    }
    if !is_riff_wave(data) {
        return decode_symphonia(data, hint);
    }
    match decode_wav(data) {
        Ok(raw) => Ok(raw),
        Err(wav_error) => {
            tracing::debug!(error = %wav_error, "hound rejected WAV, trying symphonia");
            match decode_symphonia(data, Some("wav")) {
                Ok(raw) => Ok(raw),
                Err(PipelineError::EmptyAudio) => Err(PipelineError::EmptyAudio),
                Err(_) => Err(wav_error),
            }
        }
    }
}

fn is_riff_wave(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

fn decode_wav(data: &[u8]) -> Result<RawAudio> {
    let reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| PipelineError::UnsupportedFormat {
            message: format!("invalid WAV data: {}", e),
        })?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PipelineError::UnsupportedFormat {
                message: format!("failed to read WAV samples: {}", e),
            })?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(PipelineError::UnsupportedFormat {
                    message: format!("unsupported bit depth {}", spec.bits_per_sample),
                });
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PipelineError::UnsupportedFormat {
                    message: format!("failed to read WAV samples: {}", e),
                })?
        }
    };

    Ok(RawAudio::new(samples, spec.sample_rate, spec.channels))
}

fn decode_symphonia(data: &[u8], hint_ext: Option<&str>) -> Result<RawAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = hint_ext {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PipelineError::UnsupportedFormat {
            message: format!("unrecognized container: {}", e),
        })?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| PipelineError::UnsupportedFormat {
            message: "no audio track found".to_string(),
        })?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| PipelineError::UnsupportedFormat {
            message: format!("unsupported codec: {}", e),
        })?;

    let mut layout: Option<(u32, u16)> = None;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(PipelineError::UnsupportedFormat {
                    message: format!("failed to read packet: {}", e),
                });
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "skipping corrupt audio frame");
                continue;
            }
            Err(e) => {
                return Err(PipelineError::UnsupportedFormat {
                    message: format!("failed to decode: {}", e),
                });
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }
        layout = Some((spec.rate, spec.channels.count() as u16));

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    match layout {
        Some((sample_rate, channels)) if !samples.is_empty() => {
            Ok(RawAudio::new(samples, sample_rate, channels))
        }
        _ => Err(PipelineError::EmptyAudio),
    }
}

/// Average interleaved frames into a single channel.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }
    let n = channels as usize;
    samples
        .chunks_exact(n)
        .map(|frame| frame.iter().sum::<f32>() / n as f32)
        .collect()
}

/// Windowed-sinc resampling of a mono signal.
///
/// The output is aligned with the input (filter delay removed) and has
/// exactly `ceil(len * to / from)` samples.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1).map_err(
        |e| PipelineError::UnsupportedFormat {
            message: format!("cannot resample from {} Hz: {}", from_rate, e),
        },
    )?;

    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut process = |chunk: Vec<f32>, output: &mut Vec<f32>| -> Result<()> {
        let result =
            resampler
                .process(&[chunk], None)
                .map_err(|e| PipelineError::UnsupportedFormat {
                    message: format!("resampling failed: {}", e),
                })?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
        Ok(())
    };

    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let mut input = chunk.to_vec();
        input.resize(RESAMPLE_CHUNK, 0.0);
        process(input, &mut output)?;
    }
    // Flush the filter tail.
    while output.len() < expected + delay {
        process(vec![0.0; RESAMPLE_CHUNK], &mut output)?;
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
