//! Logging setup.
//!
//! All log output goes to stderr; stdout carries command output only.
//! `RUST_LOG` overrides the level chosen from flags and config.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: pretty by default, JSON when requested.
pub fn init(verbose: bool, json_format: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize from the `[logging]` config section; CLI flags win.
pub fn init_from_config(
    config: &autotag_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let (verbose, json_format) = resolve(
        &config.logging,
        verbose_override,
        json_logs_override,
    );
    init(verbose, json_format);
}

fn resolve(
    logging: &autotag_core::config::LoggingConfig,
    verbose_override: bool,
    json_logs_override: bool,
) -> (bool, bool) {
    let verbose = verbose_override || matches!(logging.level.as_str(), "debug" | "trace");
    let json_format = json_logs_override || logging.format == "json";
    (verbose, json_format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotag_core::config::LoggingConfig;

    #[test]
    fn test_defaults_are_quiet_and_pretty() {
        assert_eq!(resolve(&LoggingConfig::default(), false, false), (false, false));
    }

    #[test]
    fn test_config_enables_debug_and_json() {
        let logging = LoggingConfig {
            level: "trace".to_string(),
            format: "json".to_string(),
        };
        assert_eq!(resolve(&logging, false, false), (true, true));
    }

    #[test]
    fn test_flags_override_config() {
        assert_eq!(resolve(&LoggingConfig::default(), true, true), (true, true));
    }
}
