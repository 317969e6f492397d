use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            notifications: NotificationConfig::default(),
            channel: ChannelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Most-recent notifications retained in the feed and the cache.
    #[serde(default = "default_notification_limit")]
    pub limit: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            limit: default_notification_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Reconnect attempts before the channel failure surfaces to the user.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Base delay between reconnect attempts; doubles per attempt.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
        }
    }
}

const fn default_notification_limit() -> usize {
    100
}

const fn default_reconnect_max_attempts() -> u32 {
    5
}

const fn default_reconnect_base_delay_ms() -> u64 {
    500
}

/// Load the user-level client config, defaulting when the file is absent.
///
/// # Errors
///
/// Read and parse failures, with the path attached. A missing file is not
/// an error.
pub fn load_client_config() -> Result<ClientConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ClientConfig::default());
    };
    load_config_from(&config_dir.join("tandem/config.toml"))
}

/// Load a client config from an explicit path, defaulting when absent.
///
/// # Errors
///
/// Read and parse failures, with the path attached.
pub fn load_config_from(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ClientConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ClientConfig::default();
        assert_eq!(config.notifications.limit, 100);
        assert_eq!(config.channel.reconnect_max_attempts, 5);
        assert_eq!(config.channel.reconnect_base_delay_ms, 500);
    }

    #[test]
    fn missing_file_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config.notifications.limit, 100);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[notifications]\nlimit = 25\n").expect("write");

        let config = load_config_from(&path).expect("parse");
        assert_eq!(config.notifications.limit, 25);
        assert_eq!(config.channel.reconnect_max_attempts, 5);
    }

    #[test]
    fn parse_error_mentions_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "limit = [not toml").expect("write");

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}
