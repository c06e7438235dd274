//! Configuration resolution for Rollcall.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/rollcall/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binaries)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Six hours: how long a displayed check-in code stays scannable.
pub const DEFAULT_SCAN_WINDOW_SECS: i64 = 6 * 60 * 60;

/// Legacy `{event_id, host_secret, timestamp}` payloads older than this are stale.
pub const DEFAULT_LEGACY_MAX_AGE_SECS: i64 = 24 * 60 * 60;

/// Complete Rollcall configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub checkin: CheckinConfig,
}

/// Server process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Server-wide HMAC key for check-in tokens. Never serialized back out.
    #[serde(skip_serializing)]
    pub token_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_path: None,
            log_level: "info".to_string(),
            token_secret: None,
        }
    }
}

/// Check-in token and payload acceptance policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinConfig {
    pub scan_window_secs: i64,
    pub accept_legacy_payloads: bool,
    pub legacy_max_age_secs: i64,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            scan_window_secs: DEFAULT_SCAN_WINDOW_SECS,
            accept_legacy_payloads: true,
            legacy_max_age_secs: DEFAULT_LEGACY_MAX_AGE_SECS,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("rollcall").join("settings.json"))
}

/// Default location of the server database.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("rollcall").join("server.db"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.server.database_path.is_some() {
        base.server.database_path = overlay.server.database_path;
    }
    if overlay.server.token_secret.is_some() {
        base.server.token_secret = overlay.server.token_secret;
    }
    base.server.listen_addr = overlay.server.listen_addr;
    base.server.log_level = overlay.server.log_level;

    base.checkin = overlay.checkin;
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("ROLLCALL_LISTEN_ADDR") {
        config.server.listen_addr = val;
    }
    if let Some(val) = var("ROLLCALL_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("ROLLCALL_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = var("ROLLCALL_TOKEN_SECRET") {
        config.server.token_secret = Some(val);
    }
    if let Some(n) = var("ROLLCALL_SCAN_WINDOW_SECS").and_then(|v| v.parse().ok()) {
        config.checkin.scan_window_secs = n;
    }
    if let Some(b) = var("ROLLCALL_ACCEPT_LEGACY").and_then(|v| v.parse().ok()) {
        config.checkin.accept_legacy_payloads = b;
    }
    if let Some(n) = var("ROLLCALL_LEGACY_MAX_AGE_SECS").and_then(|v| v.parse().ok()) {
        config.checkin.legacy_max_age_secs = n;
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.checkin.scan_window_secs <= 0 {
        return Err(Error::Config("scan_window_secs must be positive".into()));
    }
    if config.checkin.legacy_max_age_secs <= 0 {
        return Err(Error::Config("legacy_max_age_secs must be positive".into()));
    }
    if let Some(secret) = &config.server.token_secret {
        if secret.is_empty() {
            return Err(Error::Config("token_secret must not be empty".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_scan_window_is_six_hours() {
        let config = Config::default();
        assert_eq!(config.checkin.scan_window_secs, 6 * 60 * 60);
        assert!(config.checkin.accept_legacy_payloads);
        assert_eq!(config.checkin.legacy_max_age_secs, 24 * 60 * 60);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"checkin": {"accept_legacy_payloads": false}}"#).unwrap();
        assert!(!config.checkin.accept_legacy_payloads);
        assert_eq!(config.checkin.scan_window_secs, DEFAULT_SCAN_WINDOW_SECS);
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("ROLLCALL_TOKEN_SECRET", "from-env"),
            ("ROLLCALL_SCAN_WINDOW_SECS", "60"),
            ("ROLLCALL_ACCEPT_LEGACY", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.server.token_secret = Some("from-file".into());
        apply_env_overrides(&mut config, |k| env.get(k).map(ToString::to_string));

        assert_eq!(config.server.token_secret.as_deref(), Some("from-env"));
        assert_eq!(config.checkin.scan_window_secs, 60);
        assert!(!config.checkin.accept_legacy_payloads);
    }

    #[test]
    fn unparsable_env_value_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "ROLLCALL_SCAN_WINDOW_SECS").then(|| "soon".to_string())
        });
        assert_eq!(config.checkin.scan_window_secs, DEFAULT_SCAN_WINDOW_SECS);
    }

    #[test]
    fn explicit_file_is_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"listen_addr": "127.0.0.1:9000", "token_secret": "s3cret"}}"#,
        )
        .unwrap();

        let mut config = Config::default();
        merge_config(&mut config, load_config_file(&path).unwrap());
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.server.token_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/rollcall.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_scan_window_is_rejected() {
        let mut config = Config::default();
        config.checkin.scan_window_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn token_secret_is_not_serialized() {
        let mut config = Config::default();
        config.server.token_secret = Some("hidden".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hidden"));
    }
}
