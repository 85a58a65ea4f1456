//! Default configuration constants for vitrans.
//!
//! Shared by the config layer, the CLI and the HTTP server so every entry
//! point agrees on the canonical audio format and request limits.

/// Canonical sample rate in Hz for everything handed to the recognizer.
pub const SAMPLE_RATE: u32 = 16000;

/// Canonical channel count.
pub const CHANNELS: u16 = 1;

/// Canonical sample width in bits.
pub const BIT_DEPTH: u16 = 16;

/// Language forced on the speech recognizer.
pub const SOURCE_LANGUAGE: &str = "vi";

/// Language produced by the translator and spoken by the synthesizer.
pub const TARGET_LANGUAGE: &str = "en";

/// Largest accepted upload, in bytes (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Microphone recording length for the desktop pipeline.
pub const RECORD_SECS: u64 = 10;

/// Speaking rate of the local speech engine, in words per minute.
pub const TTS_RATE_WPM: u32 = 150;

/// Output volume of the local speech engine (0.0 to 1.0).
pub const TTS_VOLUME: f32 = 0.9;

/// Beam count for speech recognition. 1 means greedy decoding.
pub const BEAM_SIZE: u32 = 1;

/// Hard limit on source tokens fed to the translation encoder.
pub const MAX_INPUT_TOKENS: usize = 512;

/// Upper bound on generated target tokens.
pub const MAX_DECODE_TOKENS: usize = 512;

/// Wall-clock budget for a whole pipeline run.
pub const PIPELINE_TIMEOUT_SECS: u64 = 120;

/// Address the HTTP server binds to.
pub const BIND_ADDR: &str = "0.0.0.0:8000";

/// Public base URL used to build links to synthesized artifacts.
pub const BASE_URL: &str = "http://localhost:8000";

/// Cloud speech endpoint (Google Translate TTS).
pub const TTS_ENDPOINT: &str = "https://translate.google.com/translate_tts";

/// Longest text chunk sent to the cloud speech endpoint in one request.
pub const TTS_CHUNK_CHARS: usize = 100;

/// Number of pipeline worker threads behind the HTTP server.
pub const WORKERS: usize = 2;

/// Jobs allowed to wait for a worker before the server sheds load.
pub const QUEUE_DEPTH: usize = 16;

/// Default log filter when neither config nor `RUST_LOG` set one.
pub const LOG_FILTER: &str = "info,vitrans=info,tower_http=info";

/// Report the GPU backend compiled into this build.
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else {
        "CPU"
    }
}
