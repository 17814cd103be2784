// AutoFlow — build, store and replay automation workflows
// License: Apache-2.0

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_workflows_key")]
    pub workflows_key: String,
    #[serde(default = "default_theme_key")]
    pub theme_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            workflows_key: default_workflows_key(),
            theme_key: default_theme_key(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.autoflow/data".to_string()
}
fn default_workflows_key() -> String {
    "autoflow-workflows".to_string()
}
fn default_theme_key() -> String {
    "autoflow-theme".to_string()
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pause inserted before every step, in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

fn default_step_delay_ms() -> u64 {
    1000
}

impl ExecutionConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            let mut config = Config::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (prefix: AUTOFLOW_)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("AUTOFLOW_STORAGE_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Ok(v) = std::env::var("AUTOFLOW_EXECUTION_STEP_DELAY_MS") {
            match v.parse() {
                Ok(n) => self.execution.step_delay_ms = n,
                Err(_) => tracing::warn!(value = %v, "Ignoring non-numeric AUTOFLOW_EXECUTION_STEP_DELAY_MS"),
            }
        }
    }

    /// Resolve the data directory, expanding `~` to home directory.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = &self.storage.data_dir;
        if let Some(stripped) = dir.strip_prefix('~') {
            let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
            Ok(home.join(dir.strip_prefix("~/").unwrap_or(stripped)))
        } else {
            Ok(PathBuf::from(dir))
        }
    }

    /// Get the default config file path: ~/.autoflow/config.json
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".autoflow").join("config.json"))
    }

    /// Validate configuration for basic correctness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let keys = [&self.storage.workflows_key, &self.storage.theme_key];
        for key in keys {
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidKey("storage keys must not be empty".into()));
            }
        }
        if self.storage.workflows_key == self.storage.theme_key {
            return Err(ConfigError::InvalidKey(format!(
                "workflows and theme share the key '{}'",
                self.storage.theme_key
            )));
        }
        self.data_dir()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.storage.data_dir, "~/.autoflow/data");
        assert_eq!(cfg.storage.workflows_key, "autoflow-workflows");
        assert_eq!(cfg.storage.theme_key, "autoflow-theme");
        assert_eq!(cfg.execution.step_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_parse_minimal_json() {
        let json = r#"{"execution": {"step_delay_ms": 250}}"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.execution.step_delay_ms, 250);
        assert_eq!(cfg.storage.workflows_key, "autoflow-workflows");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"storage": {"data_dir": "/tmp/autoflow-data", "workflows_key": "wf"}}"#,
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.storage.workflows_key, "wf");
        assert_eq!(cfg.storage.theme_key, "autoflow-theme");
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_data_dir_tilde() {
        let cfg = Config::default();
        let path = cfg.data_dir().unwrap();
        assert!(path.to_str().unwrap().contains(".autoflow"));
        assert!(!path.to_str().unwrap().starts_with('~'));
    }

    #[test]
    fn test_validate_rejects_shared_key() {
        let mut cfg = Config::default();
        cfg.storage.theme_key = cfg.storage.workflows_key.clone();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidKey(_))));

        cfg.storage.theme_key = "  ".into();
        assert!(cfg.validate().is_err());
    }
}
