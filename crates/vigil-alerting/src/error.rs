//! Alerting error types.

use crate::services::{
    ActionError, ClusterError, EncryptionError, SavedObjectsError, SecurityError, TaskManagerError,
};
use thiserror::Error;

/// Result type for alerting operations.
pub type Result<T> = std::result::Result<T, AlertingError>;

/// Errors raised by the alerting core.
#[derive(Debug, Error)]
pub enum AlertingError {
    // Registration
    #[error("alert type \"{0}\" is already registered")]
    DuplicateType(String),

    #[error("alert type \"{0}\" is not registered")]
    UnknownType(String),

    #[error("invalid alert type \"{id}\": {message}")]
    InvalidAlertType { id: String, message: String },

    // Gating
    #[error("{reason}")]
    LicenseInvalid { reason: String },

    #[error(
        "unable to create alerts client because the encrypted saved objects plugin uses an ephemeral encryption key"
    )]
    EphemeralEncryptionKey,

    // Execution
    #[error("unable to decrypt attribute \"apiKey\" of alert {alert_id}: {message}")]
    CredentialDecryption { alert_id: String, message: String },

    #[error("failed to execute action {action_id}: {message}")]
    ActionDispatch { action_id: String, message: String },

    #[error("invalid params for action {action_id}: {message}")]
    ActionParams { action_id: String, message: String },

    #[error("alert executor failed: {0}")]
    Executor(String),

    #[error("unable to resolve tenant: {0}")]
    TenantResolution(String),

    // Requests
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} was changed by another request")]
    Conflict { kind: String, id: String },

    #[error("params invalid for alert type {alert_type_id}: {message}")]
    InvalidParams {
        alert_type_id: String,
        message: String,
    },

    #[error("invalid interval {0:?}: expected a positive number followed by s, m, h or d")]
    InvalidInterval(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    // Lifecycle
    #[error("task runner factory already initialized")]
    AlreadyInitialized,

    #[error("task runner factory not initialized")]
    NotInitialized,

    #[error("{0}")]
    Lifecycle(String),

    // Collaborators
    #[error("task manager error: {0}")]
    Scheduler(String),

    #[error("saved objects error: {0}")]
    Storage(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AlertingError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownType(_)
            | Self::InvalidParams { .. }
            | Self::InvalidInterval(_)
            | Self::ActionParams { .. }
            | Self::BadRequest(_) => 400,

            Self::LicenseInvalid { .. } => 403,

            Self::NotFound { .. } => 404,

            Self::DuplicateType(_) | Self::Conflict { .. } => 409,

            Self::EphemeralEncryptionKey => 503,

            Self::InvalidAlertType { .. }
            | Self::CredentialDecryption { .. }
            | Self::ActionDispatch { .. }
            | Self::Executor(_)
            | Self::TenantResolution(_)
            | Self::AlreadyInitialized
            | Self::NotInitialized
            | Self::Lifecycle(_)
            | Self::Scheduler(_)
            | Self::Storage(_)
            | Self::Encryption(_)
            | Self::Security(_)
            | Self::Cluster(_)
            | Self::Serialization(_) => 500,
        }
    }

    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateType(_) => "DUPLICATE_ALERT_TYPE",
            Self::UnknownType(_) => "UNKNOWN_ALERT_TYPE",
            Self::InvalidAlertType { .. } => "INVALID_ALERT_TYPE",
            Self::LicenseInvalid { .. } => "LICENSE_INVALID",
            Self::EphemeralEncryptionKey => "EPHEMERAL_ENCRYPTION_KEY",
            Self::CredentialDecryption { .. } => "CREDENTIAL_DECRYPTION_FAILED",
            Self::ActionDispatch { .. } => "ACTION_DISPATCH_FAILED",
            Self::ActionParams { .. } => "INVALID_ACTION_PARAMS",
            Self::Executor(_) => "EXECUTOR_FAILED",
            Self::TenantResolution(_) => "TENANT_RESOLUTION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::InvalidParams { .. } => "INVALID_PARAMS",
            Self::InvalidInterval(_) => "INVALID_INTERVAL",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Lifecycle(_) => "LIFECYCLE_ERROR",
            Self::Scheduler(_) => "TASK_MANAGER_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Encryption(_) => "ENCRYPTION_ERROR",
            Self::Security(_) => "SECURITY_ERROR",
            Self::Cluster(_) => "CLUSTER_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the request was refused by the license or encryption gate.
    pub fn is_gate_rejection(&self) -> bool {
        matches!(
            self,
            Self::LicenseInvalid { .. } | Self::EphemeralEncryptionKey
        )
    }

    pub(crate) fn not_found(kind: &str, id: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<SavedObjectsError> for AlertingError {
    fn from(err: SavedObjectsError) -> Self {
        match err {
            SavedObjectsError::NotFound { object_type, id } => Self::NotFound {
                kind: object_type,
                id,
            },
            SavedObjectsError::Conflict { object_type, id } => Self::Conflict {
                kind: object_type,
                id,
            },
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<TaskManagerError> for AlertingError {
    fn from(err: TaskManagerError) -> Self {
        Self::Scheduler(err.to_string())
    }
}

impl From<EncryptionError> for AlertingError {
    fn from(err: EncryptionError) -> Self {
        match err {
            EncryptionError::NotFound { object_type, id } => Self::NotFound {
                kind: object_type,
                id,
            },
            EncryptionError::Decryption { id, message, .. } => Self::CredentialDecryption {
                alert_id: id,
                message,
            },
            other => Self::Encryption(other.to_string()),
        }
    }
}

impl From<SecurityError> for AlertingError {
    fn from(err: SecurityError) -> Self {
        Self::Security(err.to_string())
    }
}

impl From<ClusterError> for AlertingError {
    fn from(err: ClusterError) -> Self {
        Self::Cluster(err.to_string())
    }
}

impl From<ActionError> for AlertingError {
    fn from(err: ActionError) -> Self {
        Self::ActionDispatch {
            action_id: err.action_id,
            message: err.message,
        }
    }
}
