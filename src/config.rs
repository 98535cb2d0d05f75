use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::workflow::RetryPolicy;

const APP_NAME: &str = "specflow";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Falls back to the platform data directory.
    pub database: Option<PathBuf>,
    /// Read-modify-write rounds before a conflicting mutation gives up.
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            max_attempts: RetryPolicy::default().max_attempts,
        }
    }
}

impl Config {
    /// Load configuration from the user's config directory, then apply
    /// environment overrides. Returns defaults if the file doesn't exist or
    /// fails to parse.
    pub fn load() -> Self {
        let config = match get_config_path().and_then(|path| Self::try_load(&path)) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Apply `SPECFLOW_DB` and `SPECFLOW_MAX_ATTEMPTS`. Values that don't
    /// parse are ignored.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = var("SPECFLOW_DB").filter(|s| !s.trim().is_empty()) {
            self.database = Some(PathBuf::from(path));
        }
        if let Some(attempts) = var("SPECFLOW_MAX_ATTEMPTS").and_then(|s| s.trim().parse::<u32>().ok()) {
            self.max_attempts = attempts;
        }
        self
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Database::default_path(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}
