//! Alert type definitions.

use crate::alert_instance::AlertInstanceFactory;
use crate::error::{AlertingError, Result};
use crate::services::ScopedClusterClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Action group every alert type gets unless it declares its own.
pub const DEFAULT_ACTION_GROUP: &str = "default";

/// Services available to an executor during one run.
#[derive(Clone)]
pub struct AlertServices {
    /// Cluster client acting with the alert's credential in its space.
    pub cluster: Arc<dyn ScopedClusterClient>,
    /// Fires alert instances.
    pub instances: AlertInstanceFactory,
}

impl fmt::Debug for AlertServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertServices")
            .field("instances", &self.instances)
            .finish_non_exhaustive()
    }
}

/// Everything an executor is called with.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub alert_id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub space_id: String,
    pub namespace: Option<String>,
    /// Params after the alert type's validator ran.
    pub params: Value,
    /// State the executor returned on the previous run (`{}` on the first).
    pub state: Value,
    pub started_at: DateTime<Utc>,
    pub previous_started_at: Option<DateTime<Utc>>,
    pub services: AlertServices,
}

/// Evaluates an alert's condition.
///
/// Returns the state to hand to the next run, if any. Errors fail the run;
/// the alert stays scheduled.
#[async_trait]
pub trait AlertExecutor: Send + Sync {
    async fn execute(&self, options: ExecutorOptions) -> anyhow::Result<Option<Value>>;
}

/// Checks (and may normalize) alert params.
pub trait ParamsValidator: Send + Sync {
    fn validate(&self, params: &Value) -> std::result::Result<Value, String>;
}

impl<F> ParamsValidator for F
where
    F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync,
{
    fn validate(&self, params: &Value) -> std::result::Result<Value, String> {
        self(params)
    }
}

/// A kind of alert the process can run.
#[derive(Clone)]
pub struct AlertType {
    pub id: String,
    pub name: String,
    pub action_groups: Vec<String>,
    executor: Arc<dyn AlertExecutor>,
    params_validator: Option<Arc<dyn ParamsValidator>>,
}

impl AlertType {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        executor: impl AlertExecutor + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            action_groups: vec![DEFAULT_ACTION_GROUP.to_string()],
            executor: Arc::new(executor),
            params_validator: None,
        }
    }

    pub fn with_action_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params_validator(mut self, validator: impl ParamsValidator + 'static) -> Self {
        self.params_validator = Some(Arc::new(validator));
        self
    }

    pub fn executor(&self) -> &Arc<dyn AlertExecutor> {
        &self.executor
    }

    pub fn has_action_group(&self, group: &str) -> bool {
        self.action_groups.iter().any(|g| g == group)
    }

    /// Run the params validator. Without one, params pass through.
    pub fn validate_params(&self, params: &Value) -> Result<Value> {
        match &self.params_validator {
            Some(validator) => validator
                .validate(params)
                .map_err(|message| AlertingError::InvalidParams {
                    alert_type_id: self.id.clone(),
                    message,
                }),
            None => Ok(params.clone()),
        }
    }

    /// Checks made when the type is registered.
    pub(crate) fn check_definition(&self) -> Result<()> {
        let invalid = |message: &str| AlertingError::InvalidAlertType {
            id: self.id.clone(),
            message: message.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.action_groups.is_empty() {
            return Err(invalid("at least one action group is required"));
        }
        if self.action_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(invalid("action group names must not be empty"));
        }
        Ok(())
    }

    pub fn summary(&self) -> RegisteredAlertType {
        RegisteredAlertType {
            id: self.id.clone(),
            name: self.name.clone(),
            action_groups: self.action_groups.clone(),
        }
    }
}

impl fmt::Debug for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("action_groups", &self.action_groups)
            .field("params_validator", &self.params_validator.is_some())
            .finish_non_exhaustive()
    }
}

/// Public view of a registered alert type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAlertType {
    pub id: String,
    pub name: String,
    pub action_groups: Vec<String>,
}
