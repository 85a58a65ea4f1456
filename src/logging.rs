//! Tracing subscriber setup for the `vitrans` binary.

use crate::config::LogConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter directive for the configured base filter and CLI verbosity.
///
/// Positive verbosity raises the crate's own level, negative lowers
/// everything to warnings.
pub fn filter_directive(base: &str, verbosity: i8) -> String {
    match verbosity {
        v if v < 0 => "warn".to_string(),
        0 => base.to_string(),
        1 => format!("{},vitrans=debug", base),
        _ => format!("{},vitrans=trace,tower_http=debug", base),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured filter.
///
/// Logs go to stderr so stdout stays clean for results. Calling this twice is
/// harmless; the second call keeps the first subscriber.
pub fn init_logging(config: &LogConfig, verbosity: i8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.filter, verbosity)));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()
    };

    if installed.is_ok() {
        tracing::debug!(json = config.json, verbosity, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_levels() {
        assert_eq!(filter_directive("info", 0), "info");
        assert_eq!(filter_directive("info", 1), "info,vitrans=debug");
        assert_eq!(
            filter_directive("info", 3),
            "info,vitrans=trace,tower_http=debug"
        );
        assert_eq!(filter_directive("info", -1), "warn");
    }

    #[test]
    fn test_directives_parse() {
        for verbosity in -1..=2 {
            let directive = filter_directive(&LogConfig::default().filter, verbosity);
            assert!(EnvFilter::try_new(&directive).is_ok(), "{}", directive);
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(&LogConfig::default(), 0);
        init_logging(&LogConfig::default(), 1);
    }
}
