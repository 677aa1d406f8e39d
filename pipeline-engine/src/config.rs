// Runner Configuration
// Execution tuning knobs, optionally loaded from a YAML file

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors loading a runner configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for pipeline runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerConfig {
    /// Maximum concurrently executing job instances (0 = unlimited)
    pub max_parallel_instances: usize,
    /// Remote task poll interval, in seconds
    pub poll_interval_secs: u64,
    /// Remote task wait budget, in seconds
    pub max_task_wait_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel_instances: 0,
            poll_interval_secs: 5,
            max_task_wait_secs: 600,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_task_wait(&self) -> Duration {
        Duration::from_secs(self.max_task_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_parallel_instances, 0);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.max_task_wait(), Duration::from_secs(600));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxParallelInstances: 4").unwrap();
        writeln!(file, "pollIntervalSecs: 2").unwrap();

        let config = RunnerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_parallel_instances, 4);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        // Unspecified fields keep their defaults
        assert_eq!(config.max_task_wait_secs, 600);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxParallelInstances: [not a number]").unwrap();

        let err = RunnerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
