use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Config files picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["railsync.json", "railsync.yaml", "railsync.yml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub log_dir: PathBuf,
    /// Import workers per stage; 0 runs one worker per item.
    pub concurrency: usize,
    pub compare_field: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            api_key: None,
            log_dir: PathBuf::from("railsync-logs"),
            concurrency: 8,
            compare_field: "title".into(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load an explicit config file, or the first default file found in
    /// `cwd`, or fall back to defaults.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for name in DEFAULT_CONFIG_FILES {
            let candidate = cwd.join(name);
            if candidate.is_file() {
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let config: Config = if is_yaml {
            serde_yaml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        config.validate_shape()?;
        Ok(config)
    }

    fn validate_shape(&self) -> Result<()> {
        if self.compare_field.trim().is_empty() {
            return Err(SyncError::ConfigInvalid(
                "compare_field cannot be empty".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SyncError::ConfigInvalid(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply non-empty overrides from flags or the environment.
    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self> {
        fn pick(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        if let Some(host) = pick(overrides.host) {
            self.host = Some(host);
        }
        if let Some(user) = pick(overrides.user) {
            self.user = Some(user);
        }
        if let Some(key) = pick(overrides.api_key) {
            self.api_key = Some(key);
        }
        if let Some(dir) = overrides.log_dir {
            self.log_dir = dir;
        }
        if let Some(n) = overrides.concurrency {
            self.concurrency = n;
        }
        if let Some(field) = pick(overrides.compare_field) {
            self.compare_field = field;
        }
        self.validate_shape()?;
        Ok(self)
    }

    /// Host, user and API key, or `ConfigMissing` naming the first gap.
    pub fn credentials(&self) -> Result<(&str, &str, &str)> {
        let host = self
            .host
            .as_deref()
            .ok_or(SyncError::ConfigMissing("host"))?;
        let user = self
            .user
            .as_deref()
            .ok_or(SyncError::ConfigMissing("user"))?;
        let key = self
            .api_key
            .as_deref()
            .ok_or(SyncError::ConfigMissing("api_key"))?;
        Ok((host, user, key))
    }
}

/// Values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub host: Option<String>,
    pub user: Option<String>,
    pub api_key: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub compare_field: Option<String>,
}
