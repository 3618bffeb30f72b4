//! Configuration loading and persistence.
//!
//! Handles reading and writing the boardsync configuration file. The session
//! token lives in the credentials file managed by [`crate::auth`], never here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants;

/// Push service settings (Pusher protocol, hosted or self-hosted).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PushConfig {
    /// Application key of the push service.
    pub app_key: String,
    /// Hosted cluster name (e.g. "eu"). Ignored when `host` is set.
    pub cluster: String,
    /// Base URL of a self-hosted, Pusher-compatible server
    /// (e.g. `ws://localhost:6001`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Path of the private channel authorization endpoint, relative to
    /// the API base URL.
    pub auth_path: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            cluster: "eu".to_string(),
            host: None,
            auth_path: "/broadcasting/auth".to_string(),
        }
    }
}

/// Configuration for the boardsync client.
///
/// Missing fields take their default, so a hand-edited file only needs the
/// settings it changes.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Base URL of the board API.
    pub api_base_url: String,
    /// Push channel settings.
    pub push: PushConfig,
    /// Seconds a transient feedback banner stays visible.
    pub feedback_expiry_secs: u64,
    /// Banner text while a request is in flight.
    pub loading_text: String,
    /// Banner text for failures that carry no server message.
    pub fallback_error_text: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            push: PushConfig::default(),
            feedback_expiry_secs: constants::FEEDBACK_EXPIRY.as_secs(),
            loading_text: constants::DEFAULT_LOADING_TEXT.to_string(),
            fallback_error_text: constants::DEFAULT_FALLBACK_ERROR_TEXT.to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `{tmp}/boardsync-test`
    /// 2. `BOARDSYNC_CONFIG_DIR` env var: explicit override
    /// 3. Default: platform config dir (Linux: ~/.config/boardsync)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                std::env::temp_dir().join("boardsync-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("BOARDSYNC_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("boardsync")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from_dir(&dir).unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads `config.json` from an explicit directory.
    pub fn load_from_dir(dir: &std::path::Path) -> Result<Self> {
        let config_path = dir.join(constants::CONFIG_FILE);
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", config_path.display()))
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BOARDSYNC_API_URL") {
            self.api_base_url = url;
        }

        if let Ok(key) = std::env::var("BOARDSYNC_PUSH_KEY") {
            self.push.app_key = key;
        }

        if let Ok(cluster) = std::env::var("BOARDSYNC_PUSH_CLUSTER") {
            self.push.cluster = cluster;
        }

        if let Ok(host) = std::env::var("BOARDSYNC_PUSH_HOST") {
            self.push.host = Some(host).filter(|h| !h.is_empty());
        }

        if let Ok(expiry) = std::env::var("BOARDSYNC_FEEDBACK_EXPIRY") {
            if let Ok(secs) = expiry.parse::<u64>() {
                self.feedback_expiry_secs = secs;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to_dir(&Self::config_dir()?)
    }

    /// Persists the configuration into an explicit directory.
    pub fn save_to_dir(&self, dir: &std::path::Path) -> Result<()> {
        let config_path = dir.join(constants::CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Owner read/write only
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Sets one setting by its dotted key, as used by `boardsync config`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "api_base_url" => self.api_base_url = value.to_string(),
            "push.app_key" => self.push.app_key = value.to_string(),
            "push.cluster" => self.push.cluster = value.to_string(),
            "push.host" => self.push.host = Some(value.to_string()).filter(|h| !h.is_empty()),
            "push.auth_path" => self.push.auth_path = value.to_string(),
            "feedback_expiry_secs" => {
                self.feedback_expiry_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {value}"))?;
            }
            "loading_text" => self.loading_text = value.to_string(),
            "fallback_error_text" => self.fallback_error_text = value.to_string(),
            _ => anyhow::bail!("Unknown config key '{key}'"),
        }
        Ok(())
    }

    /// Reads one setting by its dotted key.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        let pointer = format!("/{}", key.replace('.', "/"));
        match value.pointer(&pointer)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Transient feedback expiry as a [`Duration`].
    pub fn feedback_expiry(&self) -> Duration {
        Duration::from_secs(self.feedback_expiry_secs)
    }

    /// Absolute URL of the private channel authorization endpoint.
    pub fn push_auth_url(&self) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            self.push.auth_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feedback_expiry_secs, 5);
        assert_eq!(config.push.cluster, "eu");
        assert_eq!(config.push.auth_path, "/broadcasting/auth");
        assert!(config.push.host.is_none());
    }

    #[test]
    fn test_push_auth_url_trims_trailing_slash() {
        let mut config = Config::default();
        config.api_base_url = "https://board.example.com/api/".to_string();
        assert_eq!(
            config.push_auth_url(),
            "https://board.example.com/api/broadcasting/auth"
        );
    }

    #[test]
    fn test_save_and_load_round_trip_in_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.api_base_url = "https://board.example.com/api".to_string();
        config.push.host = Some("ws://localhost:6001".to_string());
        config.save_to_dir(dir.path()).unwrap();

        let loaded = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.api_base_url, "https://board.example.com/api");
        assert_eq!(loaded.push, config.push);
    }

    #[test]
    fn test_partial_file_keeps_given_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(
            dir.path().join(constants::CONFIG_FILE),
            r#"{ "api_base_url": "https://board.example.com/api", "push": { "app_key": "k" } }"#,
        )
        .unwrap();

        let loaded = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.api_base_url, "https://board.example.com/api");
        assert_eq!(loaded.push.app_key, "k");
        assert_eq!(loaded.push.cluster, "eu");
        assert_eq!(loaded.push.auth_path, "/broadcasting/auth");
        assert_eq!(loaded.loading_text, constants::DEFAULT_LOADING_TEXT);
        assert_eq!(loaded.feedback_expiry_secs, 5);
    }

    #[test]
    fn test_load_from_missing_dir_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_set_and_get_by_key() {
        let mut config = Config::default();
        config.set("push.app_key", "key-1").unwrap();
        config.set("feedback_expiry_secs", "9").unwrap();
        config.set("push.host", "").unwrap();

        assert_eq!(config.get("push.app_key").as_deref(), Some("key-1"));
        assert_eq!(config.get("feedback_expiry_secs").as_deref(), Some("9"));
        assert!(config.get("push.host").is_none());
        assert!(config.get("nope").is_none());

        assert!(config.set("feedback_expiry_secs", "soon").is_err());
        assert!(config.set("unknown", "x").is_err());
    }

    #[test]
    fn test_feedback_expiry_duration() {
        let mut config = Config::default();
        config.feedback_expiry_secs = 2;
        assert_eq!(config.feedback_expiry(), Duration::from_secs(2));
    }
}
