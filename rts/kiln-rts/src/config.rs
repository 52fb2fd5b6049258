//! Runtime configuration.
//!
//! Configuration comes from two places: runtime flags mixed into the
//! program's command line (stripped before the program sees its arguments)
//! and the `KILN_LOG` environment variable.

use thiserror::Error;
use tracing::Level;

/// Command-line flag that turns on allocation tracking and the exit report.
pub const MEM_REPORT_FLAG: &str = "--mem-report";

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "KILN_LOG";

/// Errors produced while reading the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `KILN_LOG` named a level that does not exist.
    #[error("invalid log level '{0}' in KILN_LOG (expected error, warn, info, debug or trace)")]
    InvalidLogLevel(String),
}

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Track allocations and print a leak summary on shutdown.
    pub mem_report: bool,
    /// Maximum level of runtime log events.
    pub log_level: Level,
    /// Program arguments with every runtime flag removed.
    pub args: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mem_report: false,
            log_level: Level::WARN,
            args: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Build a configuration from the program's arguments.
    ///
    /// Every occurrence of [`MEM_REPORT_FLAG`] is removed; the remaining
    /// arguments keep their order.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        for arg in args {
            let arg = arg.into();
            if arg == MEM_REPORT_FLAG {
                config.mem_report = true;
            } else {
                config.args.push(arg);
            }
        }
        config
    }

    /// Apply `KILN_LOG` from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        match std::env::var(LOG_ENV) {
            Ok(value) => self.with_log_level(&value),
            Err(_) => Ok(self),
        }
    }

    /// Set the log level from its name. Empty means the default.
    pub fn with_log_level(mut self, name: &str) -> Result<Self, ConfigError> {
        if !name.trim().is_empty() {
            self.log_level = parse_level(name)?;
        }
        Ok(self)
    }
}

/// Parse a level name, ignoring case and surrounding whitespace.
pub fn parse_level(name: &str) -> Result<Level, ConfigError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "error" => Ok(Level::ERROR),
        "warn" | "warning" => Ok(Level::WARN),
        "info" => Ok(Level::INFO),
        "debug" => Ok(Level::DEBUG),
        "trace" => Ok(Level::TRACE),
        _ => Err(ConfigError::InvalidLogLevel(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert!(!config.mem_report);
        assert_eq!(config.log_level, Level::WARN);
        assert!(config.args.is_empty());
    }

    #[test]
    fn test_mem_report_flag_is_stripped() {
        let config = RuntimeConfig::from_args(["prog", "--mem-report", "input.txt", "--mem-report"]);
        assert!(config.mem_report);
        assert_eq!(config.args, ["prog", "input.txt"]);
    }

    #[test]
    fn test_args_without_flag() {
        let config = RuntimeConfig::from_args(vec![String::from("prog"), String::from("-v")]);
        assert!(!config.mem_report);
        assert_eq!(config.args, ["prog", "-v"]);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse_level("error"), Ok(Level::ERROR));
        assert_eq!(parse_level(" Debug "), Ok(Level::DEBUG));
        assert_eq!(parse_level("TRACE"), Ok(Level::TRACE));
        assert_eq!(
            parse_level("loud"),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_with_log_level() {
        let config = RuntimeConfig::default().with_log_level("info").unwrap();
        assert_eq!(config.log_level, Level::INFO);

        let unchanged = RuntimeConfig::default().with_log_level("").unwrap();
        assert_eq!(unchanged.log_level, Level::WARN);

        let err = RuntimeConfig::default().with_log_level("nope").unwrap_err();
        assert!(err.to_string().contains("KILN_LOG"));
    }
}
