//! Audio input: capture, decoding, normalization and temporary files.

pub mod buffer;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod normalizer;
pub mod recorder;
pub mod temp;

pub use buffer::{AudioBuffer, RawAudio};
pub use normalizer::AudioNormalizer;
pub use recorder::{AudioSource, MockAudioSource, record_for};
pub use temp::TempAudioFile;
