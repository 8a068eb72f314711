//! Service configuration
//!
//! Settings are layered: built-in defaults, then a YAML file when one exists,
//! then environment variables named after a field (matched case-insensitively,
//! so `EVENT_THREADS=4` sets `event_threads`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::inventory::LockPolicy;

pub const DEFAULT_ROOT_DIR: &str = "/usr/share/playrun";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid value '{value}' for {field}")]
    InvalidValue { field: String, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Runtime settings of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Holds `inventory/`, `project/` and `artifacts/`
    pub root_dir: PathBuf,
    /// Runs whose events are kept in memory
    pub event_cache_size: usize,
    /// Runs kept resident in the registry
    pub runner_cache_size: usize,
    /// Workers per event directory scan
    pub event_threads: usize,
    pub lock_attempts: u32,
    pub lock_retry_delay_ms: u64,
    /// How long a start request waits for the run to begin executing
    pub start_timeout_secs: u64,
    /// Artifact directories older than this are removed; 0 keeps everything
    pub artifacts_remove_age_days: u64,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT_DIR),
            event_cache_size: 3,
            runner_cache_size: 5,
            event_threads: 10,
            lock_attempts: 5,
            lock_retry_delay_ms: 50,
            start_timeout_secs: 5,
            artifacts_remove_age_days: 7,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Defaults rooted at `root_dir`
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Read a YAML file; a missing file yields the defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// File (if any), then the process environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `(name, value)` pairs whose name matches a field; returns how many applied
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<usize, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut applied = 0;
        for (name, value) in vars {
            let field = name.as_ref().to_ascii_lowercase();
            let value = value.as_ref().trim();
            let matched = match field.as_str() {
                "root_dir" => {
                    self.root_dir = PathBuf::from(value);
                    true
                }
                "event_cache_size" => {
                    self.event_cache_size = parse_field(&field, value)?;
                    true
                }
                "runner_cache_size" => {
                    self.runner_cache_size = parse_field(&field, value)?;
                    true
                }
                "event_threads" => {
                    self.event_threads = parse_field(&field, value)?;
                    true
                }
                "lock_attempts" => {
                    self.lock_attempts = parse_field(&field, value)?;
                    true
                }
                "lock_retry_delay_ms" => {
                    self.lock_retry_delay_ms = parse_field(&field, value)?;
                    true
                }
                "start_timeout_secs" => {
                    self.start_timeout_secs = parse_field(&field, value)?;
                    true
                }
                "artifacts_remove_age_days" => {
                    self.artifacts_remove_age_days = parse_field(&field, value)?;
                    true
                }
                "log_level" => {
                    self.log_level = value.to_string();
                    true
                }
                _ => false,
            };
            if matched {
                info!("Configuration override: {} = {}", field, value);
                applied += 1;
            }
        }
        Ok(applied)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 5] = [
            ("event_cache_size", self.event_cache_size as u64),
            ("runner_cache_size", self.runner_cache_size as u64),
            ("event_threads", self.event_threads as u64),
            ("lock_attempts", u64::from(self.lock_attempts)),
            ("start_timeout_secs", self.start_timeout_secs),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.root_dir.join("inventory").join("hosts")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root_dir.join("artifacts")
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.artifacts_dir().join(run_id)
    }

    pub fn project_dir(&self) -> PathBuf {
        self.root_dir.join("project")
    }

    pub fn host_vars_dir(&self) -> PathBuf {
        self.project_dir().join("host_vars")
    }

    pub fn group_vars_dir(&self) -> PathBuf {
        self.project_dir().join("group_vars")
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            attempts: self.lock_attempts,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn artifacts_max_age(&self) -> Duration {
        Duration::from_secs(self.artifacts_remove_age_days * 24 * 60 * 60)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.event_cache_size, 3);
        assert_eq!(config.runner_cache_size, 5);
        assert_eq!(config.event_threads, 10);
        assert_eq!(config.lock_policy().attempts, 5);
        assert_eq!(config.lock_policy().retry_delay, Duration::from_millis(50));
        assert_eq!(config.start_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths() {
        let config = ServiceConfig::with_root("/srv/play");
        assert_eq!(config.inventory_path(), PathBuf::from("/srv/play/inventory/hosts"));
        assert_eq!(config.run_dir("r1"), PathBuf::from("/srv/play/artifacts/r1"));
        assert_eq!(config.host_vars_dir(), PathBuf::from("/srv/play/project/host_vars"));
        assert_eq!(config.group_vars_dir(), PathBuf::from("/srv/play/project/group_vars"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "event_threads: 4\nroot_dir: /data\n").unwrap();
        let config = ServiceConfig::load_from_file(&path).unwrap();
        assert_eq!(config.event_threads, 4);
        assert_eq!(config.root_dir, PathBuf::from("/data"));
        assert_eq!(config.runner_cache_size, 5);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_from_file(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "event_threads: [not a number").unwrap();
        assert!(matches!(
            ServiceConfig::load_from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides_case_insensitive_and_typed() {
        let mut config = ServiceConfig::default();
        let applied = config
            .apply_overrides([
                ("EVENT_THREADS", "2"),
                ("Runner_Cache_Size", "9"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(config.event_threads, 2);
        assert_eq!(config.runner_cache_size, 9);

        assert!(matches!(
            config.apply_overrides([("lock_attempts", "many")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = ServiceConfig::default();
        config.event_threads = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero {
                field: "event_threads"
            })
        ));
    }
}
