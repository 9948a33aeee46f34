//! Configuration management for pacer.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{PacerError, Result};

/// Top-level configuration covering both limiters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacerConfig {
    /// Leaky bucket configuration
    #[serde(default)]
    pub bucket: BucketConfig,

    /// Fixed window configuration
    #[serde(default)]
    pub window: WindowConfig,
}

/// Leaky bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum number of tokens the bucket holds
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Milliseconds between replenishment ticks
    #[serde(default = "default_replenish_interval")]
    pub replenish_interval_ms: u64,

    /// Stop replenishing after the bucket sat full and unused this long
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            replenish_interval_ms: default_replenish_interval(),
            idle_timeout_ms: None,
        }
    }
}

impl BucketConfig {
    pub fn replenish_interval(&self) -> Duration {
        Duration::from_millis(self.replenish_interval_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// Reject zero-valued settings.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PacerError::InvalidConfig(
                "bucket capacity must be greater than 0".to_string(),
            ));
        }
        if self.replenish_interval_ms == 0 {
            return Err(PacerError::InvalidConfig(
                "bucket replenish_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(PacerError::InvalidConfig(
                "bucket idle_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fixed window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Maximum invocations per window
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window")]
    pub window_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_ms: default_window(),
        }
    }
}

impl WindowConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject zero-valued settings.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(PacerError::InvalidConfig(
                "window limit must be greater than 0".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(PacerError::InvalidConfig(
                "window window_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_capacity() -> u32 {
    10
}

fn default_replenish_interval() -> u64 {
    1000
}

fn default_limit() -> u32 {
    5
}

fn default_window() -> u64 {
    1000
}

impl PacerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading pacer configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PacerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| PacerError::Config(format!("Failed to parse pacer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate both limiter sections.
    pub fn validate(&self) -> Result<()> {
        self.bucket.validate()?;
        self.window.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PacerConfig::default();
        assert_eq!(config.bucket.capacity, 10);
        assert_eq!(config.bucket.replenish_interval(), Duration::from_secs(1));
        assert_eq!(config.bucket.idle_timeout(), None);
        assert_eq!(config.window.limit, 5);
        assert_eq!(config.window.window(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
bucket:
  capacity: 3
  replenish_interval_ms: 250
  idle_timeout_ms: 5000
window:
  limit: 2
  window_ms: 1000
"#;
        let config = PacerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.bucket.capacity, 3);
        assert_eq!(config.bucket.replenish_interval(), Duration::from_millis(250));
        assert_eq!(config.bucket.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.window.limit, 2);
        assert_eq!(config.window.window_ms, 1000);
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let config = PacerConfig::from_yaml("window:\n  limit: 7\n").unwrap();
        assert_eq!(config.window.limit, 7);
        assert_eq!(config.window.window_ms, 1000);
        assert_eq!(config.bucket.capacity, 10);
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = PacerConfig::from_yaml("bucket:\n  capacity: 0\n").unwrap_err();
        assert!(matches!(err, PacerError::InvalidConfig(_)));

        let err = PacerConfig::from_yaml("window:\n  window_ms: 0\n").unwrap_err();
        assert!(matches!(err, PacerError::InvalidConfig(_)));

        let config = BucketConfig {
            idle_timeout_ms: Some(0),
            ..BucketConfig::default()
        };
        assert!(matches!(config.validate(), Err(PacerError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = PacerConfig::from_yaml("bucket: [1, 2").unwrap_err();
        assert!(matches!(err, PacerError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = PacerConfig::from_file("/nonexistent/pacer.yaml").unwrap_err();
        assert!(matches!(err, PacerError::Io(_)));
    }
}
