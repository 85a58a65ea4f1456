use crate::defaults;
use crate::error::PipelineError;
use crate::stt::WhisperConfig;
use crate::translate::MarianConfig;
use crate::tts::VoiceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub translation: TranslationConfig,
    pub tts: TtsConfig,
    pub pipeline: PipelineSection,
    pub server: ServerConfig,
    pub log: LogConfig,
    pub history: HistoryConfig,
}

/// Audio capture and upload configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub record_seconds: u64,
    /// Directory for per-run temporary audio (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model_path: PathBuf,
    pub language: String,
    pub beam_size: u32,
    pub threads: Option<usize>,
    pub use_gpu: bool,
}

/// Translation model configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    /// Directory with the converted Marian files
    pub model_dir: Option<PathBuf>,
    /// Hub repo with the same converted files, used for anything not in `model_dir`
    pub hf_repo: Option<String>,
    pub hf_revision: Option<String>,
    pub max_input_tokens: usize,
    pub max_decode_tokens: usize,
    pub truncate: bool,
    pub use_gpu: bool,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: TtsEngine,
    pub language: String,
    pub rate_wpm: u32,
    pub volume: f32,
    pub endpoint: String,
    /// Root of the served media tree; cloud artifacts land in `<media_root>/tts`
    pub media_root: PathBuf,
    pub base_url: String,
}

/// Speech synthesis engine selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    Local,
    Cloud,
}

/// Pipeline run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSection {
    /// Wall-clock budget per run (humantime, e.g. "90s", "2m")
    pub timeout: String,
    /// Run the synthesis stage after translation
    pub synthesize: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub workers: usize,
    pub queue_depth: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

/// Translation history configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON lines file; history is off when unset
    pub path: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            record_seconds: defaults::RECORD_SECS,
            temp_dir: None,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_path: Config::data_dir().join("models").join("ggml-small.bin"),
            language: defaults::SOURCE_LANGUAGE.to_string(),
            beam_size: defaults::BEAM_SIZE,
            threads: None,
            use_gpu: true,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            hf_repo: None,
            hf_revision: None,
            max_input_tokens: defaults::MAX_INPUT_TOKENS,
            max_decode_tokens: defaults::MAX_DECODE_TOKENS,
            truncate: true,
            use_gpu: true,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::Local,
            language: defaults::TARGET_LANGUAGE.to_string(),
            rate_wpm: defaults::TTS_RATE_WPM,
            volume: defaults::TTS_VOLUME,
            endpoint: defaults::TTS_ENDPOINT.to_string(),
            media_root: PathBuf::from("media"),
            base_url: defaults::BASE_URL.to_string(),
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            timeout: format!("{}s", defaults::PIPELINE_TIMEOUT_SECS),
            synthesize: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDR.to_string(),
            workers: defaults::WORKERS,
            queue_depth: defaults::QUEUE_DEPTH,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: defaults::LOG_FILTER.to_string(),
            json: false,
        }
    }
}

impl PipelineSection {
    /// Parsed run timeout.
    pub fn timeout(&self) -> Result<Duration, PipelineError> {
        humantime::parse_duration(&self.timeout).map_err(|e| PipelineError::ConfigInvalidValue {
            key: "pipeline.timeout".to_string(),
            message: format!("'{}': {}", self.timeout, e),
        })
    }
}

impl SttConfig {
    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            model_path: self.model_path.clone(),
            language: self.language.clone(),
            beam_size: self.beam_size,
            threads: self.threads,
            use_gpu: self.use_gpu,
        }
    }
}

impl TranslationConfig {
    pub fn marian_config(&self) -> MarianConfig {
        MarianConfig {
            model_dir: self.model_dir.clone(),
            hf_repo: self.hf_repo.clone(),
            hf_revision: self.hf_revision.clone(),
            max_input_tokens: self.max_input_tokens,
            max_decode_tokens: self.max_decode_tokens,
            truncate: self.truncate,
            use_gpu: self.use_gpu,
        }
    }
}

impl TtsConfig {
    pub fn voice(&self) -> VoiceConfig {
        VoiceConfig {
            language: self.language.clone(),
            rate_wpm: self.rate_wpm,
            volume: self.volume,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VITRANS_WHISPER_MODEL → stt.model_path
    /// - VITRANS_MARIAN_DIR → translation.model_dir
    /// - VITRANS_AUDIO_DEVICE → audio.device
    /// - VITRANS_TTS_ENGINE → tts.engine (local|cloud)
    /// - VITRANS_MEDIA_ROOT → tts.media_root
    /// - VITRANS_BASE_URL → tts.base_url
    /// - VITRANS_BIND → server.bind
    /// - VITRANS_HISTORY → history.path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VITRANS_WHISPER_MODEL")
            && !model.is_empty()
        {
            self.stt.model_path = PathBuf::from(model);
        }

        if let Ok(dir) = std::env::var("VITRANS_MARIAN_DIR")
            && !dir.is_empty()
        {
            self.translation.model_dir = Some(PathBuf::from(dir));
        }

        if let Ok(device) = std::env::var("VITRANS_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(engine) = std::env::var("VITRANS_TTS_ENGINE") {
            match engine.to_ascii_lowercase().as_str() {
                "local" => self.tts.engine = TtsEngine::Local,
                "cloud" => self.tts.engine = TtsEngine::Cloud,
                "" => {}
                other => tracing::warn!(value = other, "ignoring unknown VITRANS_TTS_ENGINE"),
            }
        }

        if let Ok(root) = std::env::var("VITRANS_MEDIA_ROOT")
            && !root.is_empty()
        {
            self.tts.media_root = PathBuf::from(root);
        }

        if let Ok(url) = std::env::var("VITRANS_BASE_URL")
            && !url.is_empty()
        {
            self.tts.base_url = url;
        }

        if let Ok(bind) = std::env::var("VITRANS_BIND")
            && !bind.is_empty()
        {
            self.server.bind = bind;
        }

        if let Ok(path) = std::env::var("VITRANS_HISTORY")
            && !path.is_empty()
        {
            self.history.path = Some(PathBuf::from(path));
        }

        self
    }

    /// Reject values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.pipeline.timeout()?;
        let invalid = |key: &str, message: &str| {
            Err(PipelineError::ConfigInvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };
        if self.stt.beam_size == 0 {
            return invalid("stt.beam_size", "must be at least 1");
        }
        if !self.translation.marian_config().has_source() {
            return invalid(
                "translation.model_dir",
                "not set; point it at a converted Marian vi-en model (model.safetensors, \
                 config.json, tokenizer-source.json, tokenizer-target.json) or set \
                 translation.hf_repo to a hub repo that ships those files",
            );
        }
        if self.translation.max_input_tokens < 2 {
            return invalid("translation.max_input_tokens", "must be at least 2");
        }
        if self.server.workers == 0 {
            return invalid("server.workers", "must be at least 1");
        }
        if self.server.queue_depth == 0 {
            return invalid("server.queue_depth", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.tts.volume) {
            return invalid("tts.volume", "must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vitrans/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("vitrans")
            .join("config.toml")
    }

    /// Per-user data directory (~/.local/share/vitrans on Linux)
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("vitrans")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_vitrans_env() {
        for key in [
            "VITRANS_WHISPER_MODEL",
            "VITRANS_MARIAN_DIR",
            "VITRANS_AUDIO_DEVICE",
            "VITRANS_TTS_ENGINE",
            "VITRANS_MEDIA_ROOT",
            "VITRANS_BASE_URL",
            "VITRANS_BIND",
            "VITRANS_HISTORY",
        ] {
            remove_env(key);
        }
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.record_seconds, 10);
        assert_eq!(config.audio.max_upload_bytes, 10 * 1024 * 1024);

        assert_eq!(config.stt.language, "vi");
        assert_eq!(config.stt.beam_size, 1);

        assert_eq!(config.translation.model_dir, None);
        assert_eq!(config.translation.hf_repo, None);
        assert!(config.translation.truncate);

        assert_eq!(config.tts.engine, TtsEngine::Local);
        assert_eq!(config.tts.rate_wpm, 150);
        assert_eq!(config.tts.volume, 0.9);

        assert_eq!(config.pipeline.timeout().unwrap(), Duration::from_secs(120));
        assert_eq!(config.server.bind, "0.0.0.0:8000");
        assert_eq!(config.history.path, None);
    }

    #[test]
    fn test_unset_translation_model_fails_validation() {
        let config = Config::default();

        match config.validate() {
            Err(PipelineError::ConfigInvalidValue { key, message }) => {
                assert_eq!(key, "translation.model_dir");
                assert!(message.contains("tokenizer-source.json"), "{}", message);
                assert!(message.contains("translation.hf_repo"), "{}", message);
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_translation_model_source_passes_validation() {
        let mut config = Config::default();
        config.translation.model_dir = Some(PathBuf::from("/models/opus-mt-vi-en"));
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.translation.hf_repo = Some("someone/opus-mt-vi-en-converted".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
            [audio]
            device = "hw:0,0"
            record_seconds = 5
            max_upload_bytes = 1024

            [stt]
            model_path = "/models/phowhisper.bin"
            beam_size = 5

            [translation]
            model_dir = "/models/opus-mt-vi-en"
            truncate = false

            [tts]
            engine = "cloud"
            base_url = "https://abc.ngrok.app"

            [pipeline]
            timeout = "90s"
            synthesize = false

            [server]
            bind = "127.0.0.1:9000"
            workers = 4

            [log]
            json = true

            [history]
            path = "/var/lib/vitrans/history.jsonl"
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.audio.device, Some("hw:0,0".to_string()));
        assert_eq!(config.audio.record_seconds, 5);
        assert_eq!(config.audio.max_upload_bytes, 1024);
        assert_eq!(config.stt.model_path, PathBuf::from("/models/phowhisper.bin"));
        assert_eq!(config.stt.beam_size, 5);
        assert_eq!(
            config.translation.model_dir,
            Some(PathBuf::from("/models/opus-mt-vi-en"))
        );
        assert!(!config.translation.truncate);
        assert_eq!(config.tts.engine, TtsEngine::Cloud);
        assert_eq!(config.tts.base_url, "https://abc.ngrok.app");
        assert_eq!(config.pipeline.timeout().unwrap(), Duration::from_secs(90));
        assert!(!config.pipeline.synthesize);
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.workers, 4);
        assert!(config.log.json);
        assert_eq!(
            config.history.path,
            Some(PathBuf::from("/var/lib/vitrans/history.jsonl"))
        );
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let file = write_config(
            r#"
            [tts]
            rate_wpm = 180
        "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.tts.rate_wpm, 180);
        assert_eq!(config.tts.volume, 0.9);
        assert_eq!(config.tts.engine, TtsEngine::Local);
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.stt, SttConfig::default());
    }

    #[test]
    fn test_engine_config_conversions() {
        let config = Config::default();

        let whisper = config.stt.whisper_config();
        assert_eq!(whisper.language, "vi");
        assert_eq!(whisper.beam_size, 1);

        let marian = config.translation.marian_config();
        assert_eq!(marian.max_input_tokens, 512);
        assert!(marian.truncate);

        let voice = config.tts.voice();
        assert_eq!(voice, VoiceConfig::default());
    }

    #[test]
    fn test_env_override_models() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vitrans_env();

        set_env("VITRANS_WHISPER_MODEL", "/tmp/ggml-tiny.bin");
        set_env("VITRANS_MARIAN_DIR", "/tmp/marian");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.stt.model_path, PathBuf::from("/tmp/ggml-tiny.bin"));
        assert_eq!(config.translation.model_dir, Some(PathBuf::from("/tmp/marian")));
        assert_eq!(config.stt.language, "vi");

        clear_vitrans_env();
    }

    #[test]
    fn test_env_override_serving() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vitrans_env();

        set_env("VITRANS_TTS_ENGINE", "Cloud");
        set_env("VITRANS_BASE_URL", "http://192.168.1.20:8000");
        set_env("VITRANS_BIND", "127.0.0.1:8080");
        set_env("VITRANS_HISTORY", "/tmp/history.jsonl");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.tts.engine, TtsEngine::Cloud);
        assert_eq!(config.tts.base_url, "http://192.168.1.20:8000");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.history.path, Some(PathBuf::from("/tmp/history.jsonl")));

        clear_vitrans_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vitrans_env();

        set_env("VITRANS_AUDIO_DEVICE", "");
        set_env("VITRANS_TTS_ENGINE", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.audio.device, None);
        assert_eq!(config.tts.engine, TtsEngine::Local);

        clear_vitrans_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let file = write_config(
            r#"
            [audio
            device = "broken
        "#,
        );

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_unknown_engine_is_rejected() {
        let file = write_config("[tts]\nengine = \"festival\"\n");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_bad_timeout_fails_validation() {
        let mut config = Config::default();
        config.pipeline.timeout = "soon".to_string();

        match config.validate() {
            Err(PipelineError::ConfigInvalidValue { key, .. }) => {
                assert_eq!(key, "pipeline.timeout");
            }
            other => panic!("Expected ConfigInvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let mut config = Config::default();
        config.server.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("vitrans"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let file = write_config("[audio\n");
        let err = Config::load_or_default(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.tts.engine = TtsEngine::Cloud;
        config.history.path = Some(PathBuf::from("/tmp/h.jsonl"));

        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
