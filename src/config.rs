//! Client configuration.
//!
//! Defaults are embedded from `config/default_config.toml`; a user file in the
//! data directory overrides individual keys, and a few environment variables
//! override the endpoints last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("../config/default_config.toml");

pub const APP_DIR_NAME: &str = "insights-client";
pub const CONFIG_FILE_NAME: &str = "config.toml";

pub const ENV_API_URL: &str = "INSIGHTS_API_URL";
pub const ENV_IDENTITY_URL: &str = "INSIGHTS_IDENTITY_URL";
pub const ENV_IDENTITY_ANON_KEY: &str = "INSIGHTS_IDENTITY_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub identity_url: String,
    pub identity_anon_key: String,
    pub request_timeout_secs: u64,
    pub retry_interval_ms: u64,
    pub max_sync_attempts: u32,
    pub windows: Vec<u16>,
    pub default_window: u16,
    pub background_stagger_ms: u64,
    pub comparison_long_window: u16,
    pub comparison_short_window: u16,
    /// Ask the backend for a dedicated previous-period dataset before
    /// synthesizing one from the long and short windows.
    #[serde(default)]
    pub previous_period_feed: bool,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub default_page_size: usize,
}

impl Default for ClientConfig {
    /// # Panics
    /// Panics if the embedded TOML is invalid (a build-time bug).
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default_config.toml must be valid TOML")
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn background_stagger(&self) -> Duration {
        Duration::from_millis(self.background_stagger_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Windows other than the default, in configured order.
    pub fn background_windows(&self) -> Vec<u16> {
        self.windows
            .iter()
            .copied()
            .filter(|days| *days != self.default_window)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        if url::Url::parse(&self.api_base_url).is_err() {
            bail!("api_base_url is not a valid URL: {}", self.api_base_url);
        }
        if self.max_sync_attempts == 0 {
            bail!("max_sync_attempts must be at least 1");
        }
        if self.poll_max_attempts == 0 {
            bail!("poll_max_attempts must be at least 1");
        }
        if self.windows.is_empty() || self.windows.contains(&0) {
            bail!("windows must be a non-empty list of positive day counts");
        }
        if !self.windows.contains(&self.default_window) {
            bail!(
                "default_window {} is not one of the configured windows {:?}",
                self.default_window,
                self.windows
            );
        }
        if self.comparison_long_window <= self.comparison_short_window {
            bail!(
                "comparison_long_window ({}) must be longer than comparison_short_window ({})",
                self.comparison_long_window,
                self.comparison_short_window
            );
        }
        if self.default_page_size == 0 {
            bail!("default_page_size must be at least 1");
        }
        Ok(())
    }
}

/// Default data directory: `<platform data dir>/insights-client`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Load configuration, layering the file at `path` (if it exists) over the
/// embedded defaults, then applying environment overrides.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let mut table: toml::Table = toml::from_str(DEFAULT_CONFIG)?;

    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let overrides: toml::Table = toml::from_str(&content)?;
        for (key, value) in overrides {
            if !table.contains_key(&key) {
                warn!("Ignoring unknown config key '{}' in {:?}", key, path);
                continue;
            }
            table.insert(key, value);
        }
        info!("Loaded config overrides from {:?}", path);
    }

    let mut config: ClientConfig = toml::Value::Table(table).try_into()?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// Load from `<data_dir>/config.toml`.
pub fn load_from_data_dir(data_dir: &Path) -> Result<ClientConfig> {
    load_config(&data_dir.join(CONFIG_FILE_NAME))
}

fn apply_env_overrides(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty(ENV_API_URL) {
        config.api_base_url = url;
    }
    if let Some(url) = non_empty(ENV_IDENTITY_URL) {
        config.identity_url = url;
    }
    if let Some(key) = non_empty(ENV_IDENTITY_ANON_KEY) {
        config.identity_anon_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_sync_attempts, 3);
        assert_eq!(config.windows, vec![3, 7, 14, 30, 90]);
        assert_eq!(config.default_window, 7);
        assert!(!config.previous_period_feed);
    }

    #[test]
    fn test_background_windows_excludes_default() {
        let config = ClientConfig::default();
        assert_eq!(config.background_windows(), vec![3, 14, 30, 90]);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.retry_interval_ms, ClientConfig::default().retry_interval_ms);
    }

    #[test]
    fn test_file_overrides_single_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "poll_max_attempts = 5\nunknown_key = true\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.poll_max_attempts, 5);
        assert_eq!(config.poll_interval_ms, 5000);
    }

    #[test]
    fn test_invalid_default_window_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "default_window = 60\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("default_window"), "got: {}", err);
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let mut config = ClientConfig::default();
        apply_env_overrides(&mut config, |name| match name {
            ENV_API_URL => Some("http://localhost:8000".to_string()),
            ENV_IDENTITY_URL => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.identity_url, ClientConfig::default().identity_url);
    }
}
