//! Client configuration
//!
//! Read from `~/.config/passvault/config.toml` when present. Missing keys
//! fall back to defaults, and `PASSVAULT_URL` / `PASSVAULT_SESSION` win
//! over both.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::Paths;

/// Environment variable overriding `server_url`
pub const ENV_SERVER_URL: &str = "PASSVAULT_URL";
/// Environment variable overriding `session_file`
pub const ENV_SESSION_FILE: &str = "PASSVAULT_SESSION";

/// passvault configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Base URL of the vault service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Where the session is persisted (defaults to the data directory)
    #[serde(default)]
    pub session_file: Option<PathBuf>,

    /// How many delivered notifications to remember
    #[serde(default = "default_notification_history")]
    pub notification_history: usize,
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_notification_history() -> usize {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
            session_file: None,
            notification_history: default_notification_history(),
        }
    }
}

impl Config {
    /// Load from the standard location, then apply environment overrides
    pub fn load(paths: &Paths) -> Result<Self> {
        let mut config = Self::load_from(&paths.config_file())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific file, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
        if let Some(path) = lookup(ENV_SESSION_FILE).filter(|v| !v.is_empty()) {
            self.session_file = Some(PathBuf::from(path));
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolved session file location
    pub fn session_path(&self, paths: &Paths) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(|| paths.session_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.notification_history, 50);
        assert!(config.session_file.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = Config::load_from(&dir.path().join("nope.toml"))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_partial_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "server_url = \"https://vault.example.com\"\nrequest_timeout_secs = 5\n",
        )?;

        let config = Config::load_from(&path)?;
        assert_eq!(config.server_url, "https://vault.example.com");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.notification_history, 50);
        Ok(())
    }

    #[test]
    fn test_invalid_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_url = [")?;
        assert!(Config::load_from(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_SERVER_URL => Some("http://10.0.0.2:9000".to_string()),
            ENV_SESSION_FILE => Some("/tmp/session.json".to_string()),
            _ => None,
        });
        assert_eq!(config.server_url, "http://10.0.0.2:9000");
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.json")));

        let paths = Paths::rooted("/srv");
        assert_eq!(config.session_path(&paths), PathBuf::from("/tmp/session.json"));
    }

    #[test]
    fn test_empty_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, Config::default());
    }
}
