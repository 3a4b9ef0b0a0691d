//! Application configuration management.
//!
//! Holds the API endpoint, list defaults (page size, search debounce) and the
//! fetch cache tuning. Stored at `~/.config/causeboard/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::debounce::DEFAULT_QUIET_INTERVAL;
use crate::query::DEFAULT_PAGE_SIZE;

/// Application name used for config directory paths
const APP_NAME: &str = "causeboard";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API endpoint for local development
const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Read-heavy lists rarely change within 5 minutes.
const DEFAULT_TTL_SECS: u64 = 300;

/// Retries after the first failed attempt of a list fetch.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// How long an unobserved entry survives (back/forward navigation).
const DEFAULT_RETENTION_SECS: u64 = 600;

/// Fetch cache tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_retries: u32,
    pub retention_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retention_secs: DEFAULT_RETENTION_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
    pub page_size: usize,
    pub debounce_ms: u64,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_username: None,
            page_size: DEFAULT_PAGE_SIZE,
            debounce_ms: DEFAULT_QUIET_INTERVAL.as_millis() as u64,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"api_base_url": "https://api.example.org", "cache": {"max_retries": 1}}"#,
        )
        .expect("Failed to parse config test JSON");
        assert_eq!(config.api_base_url, "https://api.example.org");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.cache.max_retries, 1);
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.debounce(), Duration::from_millis(400));
    }
}
