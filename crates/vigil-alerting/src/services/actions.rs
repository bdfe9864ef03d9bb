//! Action execution contract.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use vigil_common_secret::SecretString;

/// A request to execute one configured action.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Action (connector) id.
    pub action_id: String,
    /// Rendered action params.
    pub params: Value,
    /// Space the alert lives in.
    pub space_id: String,
    /// Base path of the alert's space, for links in notifications.
    pub base_path: String,
    /// Credential of the alert, when it has one.
    pub api_key: Option<SecretString>,
}

/// Action execution failure.
#[derive(Debug, Clone, Error)]
#[error("action {action_id}: {message}")]
pub struct ActionError {
    pub action_id: String,
    pub message: String,
}

impl ActionError {
    pub fn new(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            message: message.into(),
        }
    }
}

/// Executes actions on behalf of fired alerts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute (or enqueue) one action.
    async fn execute(&self, request: ExecuteRequest) -> Result<(), ActionError>;
}
