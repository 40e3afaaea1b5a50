//! TOML-based configuration for VaultSync.
//!
//! Sensitive values (the remote access token) are stored as `_env` fields
//! that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote store settings.
    pub remote: RemoteConfig,

    /// Sync behaviour settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

/// Remote store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote store API, e.g. `https://sync.example.com/api`.
    pub base_url: String,

    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (never serialized, never read from the file).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_token_env() -> String {
    "VAULTSYNC_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Sync behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Human-readable device name, recorded on every sync action.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Case-insensitive extension allow-list for upward sync.
    #[serde(default = "default_extensions")]
    pub syncable_extensions: Vec<String>,

    /// Glob patterns excluded from upward sync, matched against the
    /// relative path.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Maximum upload size in bytes. 0 = no limit.
    #[serde(default)]
    pub max_upload_size: u64,

    /// Per-network-call timeout in seconds.
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            syncable_extensions: default_extensions(),
            ignore_patterns: Vec::new(),
            max_upload_size: 0,
            network_timeout_secs: default_network_timeout(),
        }
    }
}

fn default_device_name() -> String {
    "vaultsync".into()
}

fn default_extensions() -> Vec<String> {
    [
        "md", "txt", "json", "csv", "org", "tex", "yaml", "yml", "toml", "html", "css", "js",
        "xml",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_network_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persistent data (the metadata database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of the local file tree to synchronize.
    #[serde(default = "default_tree_root")]
    pub tree_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tree_root: default_tree_root(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultsync")
}

fn default_tree_root() -> PathBuf {
    PathBuf::from(".")
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Slack incoming-webhook URL, if Slack notifications are wanted.
    pub slack_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

// ---------------------------------------------------------------------------
// Loading / validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load the configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        info!(path = %path.display(), "loading configuration");
        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!("configuration parsed");
        Ok(config)
    }

    /// Resolve `_env` references into actual secret values.
    ///
    /// A missing token variable is not an error here: the engine reports the
    /// unauthenticated state once, before any network call.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        match std::env::var(&self.remote.token_env) {
            Ok(token) if !token.is_empty() => {
                debug!(var = %self.remote.token_env, "resolved remote token");
                self.remote.token = Some(token);
            }
            _ => {
                debug!(var = %self.remote.token_env, "remote token not set");
                self.remote.token = None;
            }
        }
        Ok(())
    }

    /// Validate field values that cannot be checked by serde alone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "remote.base_url".into(),
                detail: "must not be empty".into(),
            });
        }
        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "remote.base_url".into(),
                detail: "must start with http:// or https://".into(),
            });
        }
        if self.sync.network_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sync.network_timeout_secs".into(),
                detail: "must be greater than zero".into(),
            });
        }
        if self.sync.syncable_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.syncable_extensions".into(),
                detail: "allow-list must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
[remote]
base_url = "https://sync.example.com/api"
"#
    }

    #[test]
    fn test_parse_minimal_config_with_defaults() {
        let config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.remote.base_url, "https://sync.example.com/api");
        assert_eq!(config.remote.token_env, "VAULTSYNC_TOKEN");
        assert_eq!(config.sync.network_timeout_secs, 30);
        assert!(config.sync.syncable_extensions.contains(&"md".to_string()));
        assert!(config.notifications.slack_webhook_url.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.remote.base_url = "ftp://nope".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config: AppConfig = toml::from_str(minimal_toml()).unwrap();
        config.sync.network_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load_from_file("/nonexistent/vaultsync.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
[remote]
base_url = "https://sync.example.com/api"
token_env = "MY_TOKEN"

[sync]
device_name = "laptop"
syncable_extensions = ["md", "txt"]
ignore_patterns = ["drafts/**"]
max_upload_size = 1048576
network_timeout_secs = 10

[storage]
data_dir = "/tmp/vaultsync"
tree_root = "/home/user/notes"

[notifications]
slack_webhook_url = "https://hooks.slack.com/services/x"

[log]
level = "debug"
"#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.sync.device_name, "laptop");
        assert_eq!(config.sync.syncable_extensions.len(), 2);
        assert_eq!(config.sync.max_upload_size, 1_048_576);
        assert!(config.notifications.slack_webhook_url.is_some());
        config.validate().unwrap();
    }
}
