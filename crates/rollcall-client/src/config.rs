//! Client configuration.
//!
//! Persists the server URL and the signed-in owner to
//! `~/.rollcall/client.json`. The action queue lives next to it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Persistent client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Rollcall server base URL (e.g., "<https://rollcall.example.org>").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// User whose actions are captured and synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl ClientConfig {
    /// Path to the client directory: `~/.rollcall/`.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".rollcall"))
    }

    /// Path to the config file: `~/.rollcall/client.json`.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("client.json"))
    }

    /// Path to the queue database: `~/.rollcall/queue.db`.
    pub fn queue_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("queue.db"))
    }

    /// Load config from disk. Returns default if file doesn't exist or is invalid.
    pub fn load() -> Self {
        Self::config_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path =
            Self::config_path().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn require_owner(&self) -> anyhow::Result<&str> {
        self.owner_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not signed in. Run: rollcall login --owner <id>"))
    }
}
