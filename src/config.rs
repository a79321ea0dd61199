use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::batching::DEFAULT_BATCH_SIZE;
use crate::dispatcher::DEFAULT_MIN_INTERVAL;
use crate::error::IngestError;

/// Service tunables. Any field missing from a config file takes its default.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum identifiers per batch.
    pub batch_size: usize,
    /// Minimum milliseconds between one batch completing and the next
    /// starting.
    pub rate_limit_ms: u64,
    /// Milliseconds the simulated downstream call takes per identifier.
    pub process_delay_ms: u64,
    /// Longest accepted request line, in bytes, excluding the CRLF.
    pub max_line_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rate_limit_ms: DEFAULT_MIN_INTERVAL.as_millis() as u64,
            process_delay_ms: 1000,
            max_line_len: 65535,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing config")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;

        Self::from_yaml_str(&yaml)
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidConfiguration(
                "batch_size must be positive".into(),
            ));
        }

        if self.max_line_len == 0 {
            return Err(IngestError::InvalidConfiguration(
                "max_line_len must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn process_delay(&self) -> Duration {
        Duration::from_millis(self.process_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.rate_limit(), Duration::from_secs(5));
        assert_eq!(config.process_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml() {
        let config = Config::from_yaml_str("batch_size: 10\n").unwrap();

        assert_eq!(
            config,
            Config {
                batch_size: 10,
                ..Config::default()
            }
        );
    }

    #[test]
    fn test_bad_yaml() {
        assert!(Config::from_yaml_str("batch_size: -1\n").is_err());
        assert!(Config::from_yaml_str("batch_sise: 3\n").is_err());
    }

    #[test]
    fn test_validate() {
        let zero_batch = Config {
            batch_size: 0,
            ..Config::default()
        };
        let zero_line = Config {
            max_line_len: 0,
            ..Config::default()
        };

        assert!(matches!(
            zero_batch.validate(),
            Err(IngestError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            zero_line.validate(),
            Err(IngestError::InvalidConfiguration(_))
        ));
    }
}
