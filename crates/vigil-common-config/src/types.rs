//! Configuration types.

use serde::{Deserialize, Serialize};
use vigil_common_secret::SecretString;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    /// HTTP server settings the alerting core needs.
    pub server: ServerConfig,
    /// Credential encryption settings.
    pub encrypted_saved_objects: EncryptedSavedObjectsConfig,
    /// Background scheduler settings.
    pub task_manager: TaskManagerConfig,
    /// Alerting defaults.
    pub alerting: AlertingConfig,
}

/// Server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base path the server is mounted under, without trailing slash.
    ///
    /// Used as the action base path when no spaces collaborator is present.
    pub base_path: String,
}

/// Encryption settings for stored alert credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptedSavedObjectsConfig {
    /// Durable encryption key. When absent, an ephemeral key is generated
    /// at startup and the alerts API stays disabled.
    pub encryption_key: Option<SecretString>,
}

/// Minimum length of a configured encryption key.
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

/// Background scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// How often due tasks are polled, as an interval string (`"3s"`).
    pub poll_interval: String,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: "3s".to_string(),
        }
    }
}

/// Alerting defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Schedule used for alerts created without an explicit interval.
    pub default_interval: String,
    /// Space requests fall back to when no space is named.
    pub default_space: String,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            default_interval: "1m".to_string(),
            default_space: "default".to_string(),
        }
    }
}
