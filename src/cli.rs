//! Command-line interface for vitrans
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Vietnamese to English speech translation
#[derive(Parser, Debug)]
#[command(
    name = "vitrans",
    version,
    about = "Vietnamese to English speech translation"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Time budget for one run (default: from config). Examples: 30s, 2m, 1m30s
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Skip speech synthesis, stop after translation
    #[arg(long, global = true)]
    pub no_speak: bool,
}

impl Cli {
    /// Log verbosity: -1 when quiet, otherwise the -v count.
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            self.verbose.min(i8::MAX as u8) as i8
        }
    }
}

/// Parse a timeout string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`), and compound (`1m30s`). Zero is rejected.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    let duration = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if duration.is_zero() {
        return Err("timeout must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record from the microphone, translate, and speak the result
    Record {
        /// Audio input device (e.g., hw:0)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Recording length in seconds (default: from config)
        #[arg(long, short = 's', value_name = "SECONDS")]
        seconds: Option<u64>,
    },

    /// Translate a Vietnamese audio file (WAV or MP3)
    File {
        /// Audio file to translate
        path: PathBuf,
    },

    /// Translate Vietnamese text
    Translate {
        /// Text to translate
        text: String,

        /// Speak the translation
        #[arg(long)]
        speak: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Listen address (e.g., 0.0.0.0:8000)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Public base URL used in speech links
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Number of pipeline worker threads
        #[arg(long, value_name = "N")]
        workers: Option<usize>,
    },

    /// List available audio input devices
    #[cfg(feature = "cpal-audio")]
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_defaults() {
        let cli = Cli::try_parse_from(["vitrans", "record"]).unwrap();
        match cli.command {
            Commands::Record { device, seconds } => {
                assert!(device.is_none());
                assert!(seconds.is_none());
            }
            _ => panic!("Expected Record command"),
        }
        assert!(!cli.quiet);
        assert!(!cli.no_speak);
        assert_eq!(cli.verbose, 0);
        assert!(cli.timeout.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_record_with_options() {
        let cli = Cli::try_parse_from([
            "vitrans", "record", "--device", "hw:1", "-s", "8", "--no-speak",
        ])
        .unwrap();
        match cli.command {
            Commands::Record { device, seconds } => {
                assert_eq!(device.as_deref(), Some("hw:1"));
                assert_eq!(seconds, Some(8));
            }
            _ => panic!("Expected Record command"),
        }
        assert!(cli.no_speak);
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["vitrans", "-vv", "record"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.verbosity(), 2);
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let cli = Cli::try_parse_from(["vitrans", "-q", "-v", "record"]).unwrap();
        assert_eq!(cli.verbosity(), -1);
    }

    #[test]
    fn test_parse_file() {
        let cli = Cli::try_parse_from(["vitrans", "file", "clip.wav"]).unwrap();
        match cli.command {
            Commands::File { path } => assert_eq!(path, PathBuf::from("clip.wav")),
            _ => panic!("Expected File command"),
        }
    }

    #[test]
    fn test_file_requires_path() {
        let err = Cli::try_parse_from(["vitrans", "file"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_parse_translate_with_speak() {
        let cli = Cli::try_parse_from(["vitrans", "translate", "xin chào", "--speak"]).unwrap();
        match cli.command {
            Commands::Translate { text, speak } => {
                assert_eq!(text, "xin chào");
                assert!(speak);
            }
            _ => panic!("Expected Translate command"),
        }
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from([
            "vitrans",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--base-url",
            "https://example.org",
            "--workers",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Serve {
                bind,
                base_url,
                workers,
            } => {
                assert_eq!(bind.as_deref(), Some("0.0.0.0:9000"));
                assert_eq!(base_url.as_deref(), Some("https://example.org"));
                assert_eq!(workers, Some(4));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["vitrans", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));

        let cli = Cli::try_parse_from(["vitrans", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "vitrans",
            "file",
            "a.wav",
            "--config",
            "/tmp/config.toml",
            "--timeout",
            "1m30s",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert_eq!(cli.timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_missing_command_returns_error() {
        assert!(Cli::try_parse_from(["vitrans"]).is_err());
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["vitrans", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["vitrans", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_parse_timeout_formats() {
        assert_eq!(parse_timeout("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_timeout("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_timeout("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_timeout(" 500ms "), Ok(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_timeout_rejects_zero_and_garbage() {
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
