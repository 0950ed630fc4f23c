//! Standard paths used by passvault

use std::path::PathBuf;

/// Standard passvault paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Data directory (~/.local/share/passvault)
    pub data: PathBuf,
    /// Config directory (~/.config/passvault)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("passvault");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("passvault");

        Self { data, config }
    }

    /// Rooted under a single directory (tests, portable installs)
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data: root.join("data"),
            config: root.join("config"),
        }
    }

    /// Persisted session (token + username)
    pub fn session_file(&self) -> PathBuf {
        self.data.join("session.json")
    }

    /// User configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}
