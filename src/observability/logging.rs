//! Structured logging.

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::config::GatewayConfig;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, multi-line.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Level filter.
    pub filter: EnvFilter,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from the gateway configuration.
    ///
    /// `RUST_LOG` wins over `log_level`; `verbose` forces `debug` when
    /// `RUST_LOG` is unset.
    #[must_use]
    pub fn from_gateway(config: &GatewayConfig, verbose: bool) -> Self {
        let directives = filter_directives(
            std::env::var("RUST_LOG").ok().as_deref(),
            &config.log_level,
            verbose,
        );
        Self {
            filter: EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info")),
            format: if config.log_json {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            },
            file: config.log_file.clone(),
        }
    }
}

fn filter_directives(rust_log: Option<&str>, level: &str, verbose: bool) -> String {
    match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
        Some(env) => env.to_string(),
        None if verbose => "debug".to_string(),
        None => level.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        assert_eq!(
            filter_directives(Some("cfsecurity=trace"), "info", true),
            "cfsecurity=trace"
        );
        assert_eq!(filter_directives(Some("  "), "WARN", false), "warn");
        assert_eq!(filter_directives(None, "info", true), "debug");
        assert_eq!(filter_directives(None, "error", false), "error");
    }

    #[test]
    fn test_format_follows_config() {
        let mut config = GatewayConfig::default();
        config.log_json = true;
        assert_eq!(LoggingConfig::from_gateway(&config, false).format, LogFormat::Json);
        config.log_json = false;
        assert_eq!(LoggingConfig::from_gateway(&config, false).format, LogFormat::Pretty);
    }
}
