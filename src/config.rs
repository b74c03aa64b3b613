//! Core configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay after a connectivity edge before a sync pass starts, to avoid
    /// syncing against a flapping connection
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Failed passes before an operation is marked poisoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Retained chat messages in the capped history namespace
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Chat request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Session storage quota in bytes
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: usize,
}

// Defaults
fn default_settle_delay() -> u64 { 1000 }
fn default_max_attempts() -> u32 { 5 }
fn default_history_limit() -> usize { 50 }
fn default_request_timeout() -> u64 { 30_000 }
fn default_quota_bytes() -> usize { 5 * 1024 * 1024 }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            quota_bytes: default_quota_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.sync.settle_delay_ms, 1000);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.chat.history_limit, 50);
        assert_eq!(config.storage.quota_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: CoreConfig =
            serde_json::from_str(r#"{ "sync": { "settle_delay_ms": 50 } }"#).unwrap();
        assert_eq!(config.sync.settle_delay_ms, 50);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.chat.history_limit, 50);
    }
}
