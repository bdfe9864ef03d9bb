//! Scheduler-driven alert execution.
//!
//! The scheduler asks the [`TaskRunnerFactory`] for a [`TaskRunner`] each
//! time an alert's task is due. A run resolves the alert's tenant, decrypts
//! its credential, evaluates the alert type's executor, dispatches actions
//! for fired instances that are not muted or throttled, and hands back the
//! state for the next run. Nothing is kept in memory between runs.

use crate::alert::{AlertTaskParams, AlertTaskState, DecryptedAlert, ALERT_SAVED_OBJECT_TYPE};
use crate::alert_instance::{AlertInstance, AlertInstanceFactory};
use crate::alert_type::{AlertServices, AlertType, ExecutorOptions};
use crate::error::{AlertingError, Result};
use crate::services::{
    ActionExecutor, ClusterClient, EncryptedSavedObjects, ExecuteRequest, TaskInstance, TaskRun,
    TaskRunError, TaskRunResult,
};
use crate::templating::{ActionParamsRenderer, ActionTemplateVars};
use crate::tenant::{TenantContext, TenantResolver};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, warn, Instrument};
use vigil_common_log::spans::{alert_run_span, record_error};
use vigil_common_secret::CredentialRedactor;

/// Collaborators runners are bound to. Supplied once, at start.
pub struct TaskRunnerContext {
    pub tenants: TenantResolver,
    pub cluster: Arc<dyn ClusterClient>,
    pub actions: Arc<dyn ActionExecutor>,
    pub encrypted_saved_objects: Arc<dyn EncryptedSavedObjects>,
}

/// Builds runners for alert tasks.
///
/// Definitions are registered with the scheduler at setup, before the
/// collaborators exist; [`initialize`](Self::initialize) supplies them at
/// start.
pub struct TaskRunnerFactory {
    context: OnceLock<Arc<TaskRunnerContext>>,
    renderer: Arc<ActionParamsRenderer>,
}

impl TaskRunnerFactory {
    pub fn new() -> Self {
        Self {
            context: OnceLock::new(),
            renderer: Arc::new(ActionParamsRenderer::new()),
        }
    }

    /// Bind collaborators. Fails with [`AlertingError::AlreadyInitialized`]
    /// on a second call; the first binding stays.
    pub fn initialize(&self, context: TaskRunnerContext) -> Result<()> {
        self.context
            .set(Arc::new(context))
            .map_err(|_| AlertingError::AlreadyInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.context.get().is_some()
    }

    /// Runner for one invocation of `task`.
    pub fn create(&self, alert_type: Arc<AlertType>, task: TaskInstance) -> Result<TaskRunner> {
        let context = self.context.get().cloned().ok_or(AlertingError::NotInitialized)?;
        Ok(TaskRunner {
            context,
            renderer: Arc::clone(&self.renderer),
            alert_type,
            task,
        })
    }
}

impl Default for TaskRunnerFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// A failed run, with the next run time when the alert could be loaded.
#[derive(Debug)]
pub struct AlertRunError {
    pub error: AlertingError,
    pub run_at: Option<DateTime<Utc>>,
}

/// One invocation of an alert task.
pub struct TaskRunner {
    context: Arc<TaskRunnerContext>,
    renderer: Arc<ActionParamsRenderer>,
    alert_type: Arc<AlertType>,
    task: TaskInstance,
}

impl TaskRunner {
    /// Run the alert once.
    pub async fn run(&self) -> std::result::Result<TaskRunResult, AlertRunError> {
        let params: AlertTaskParams = serde_json::from_value(self.task.params.clone())
            .map_err(|err| AlertRunError {
                error: err.into(),
                run_at: None,
            })?;

        let span = alert_run_span(&params.alert_id, &self.alert_type.id, &params.space_id);
        async {
            let started_at = Utc::now();
            let result = self.run_alert(&params, started_at).await;
            if let Err(failure) = &result {
                record_error(&failure.error);
                error!(
                    target: "plugins::alerting",
                    task_id = %self.task.id,
                    error = %CredentialRedactor::redact(&failure.error.to_string()),
                    "executing alert {}:{} failed",
                    self.alert_type.id,
                    params.alert_id
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_alert(
        &self,
        params: &AlertTaskParams,
        started_at: DateTime<Utc>,
    ) -> std::result::Result<TaskRunResult, AlertRunError> {
        let no_schedule = |error| AlertRunError { error, run_at: None };

        // Tenant first, so nothing tenant-related can fail once the
        // credential is decrypted.
        let tenant = self
            .context
            .tenants
            .tenant_for_space(&params.space_id, None, None)
            .map_err(no_schedule)?;
        let base_path = self.context.tenants.base_path(&tenant.space_id);

        let decrypted = self
            .load_alert(&params.alert_id, tenant.namespace())
            .await
            .map_err(no_schedule)?;
        let run_at = decrypted
            .alert
            .interval
            .next_run_at(started_at)
            .map_err(no_schedule)?;

        let tenant = TenantContext {
            principal: decrypted.alert.api_key_owner.clone(),
            api_key: decrypted.api_key.clone(),
            ..tenant
        };

        match self.execute(decrypted, tenant, &base_path, started_at).await {
            Ok(state) => Ok(TaskRunResult {
                state,
                run_at: Some(run_at),
            }),
            Err(error) => Err(AlertRunError {
                error,
                run_at: Some(run_at),
            }),
        }
    }

    async fn load_alert(&self, alert_id: &str, namespace: Option<&str>) -> Result<DecryptedAlert> {
        let object = self
            .context
            .encrypted_saved_objects
            .get_decrypted_as_internal_user(ALERT_SAVED_OBJECT_TYPE, alert_id, namespace)
            .await?;
        DecryptedAlert::from_saved_object(object)
    }

    async fn execute(
        &self,
        decrypted: DecryptedAlert,
        tenant: TenantContext,
        base_path: &str,
        started_at: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        let alert = decrypted.alert;
        let previous = AlertTaskState::from_task_state(&self.task.state)?;
        let params = self.alert_type.validate_params(&alert.params)?;

        let instances = AlertInstanceFactory::new(previous.alert_instances, &self.alert_type.action_groups);
        let services = AlertServices {
            cluster: self.context.cluster.as_scoped(&tenant),
            instances: instances.clone(),
        };

        let alert_type_state = self
            .alert_type
            .executor()
            .execute(ExecutorOptions {
                alert_id: alert.id.clone(),
                name: alert.name.clone(),
                tags: alert.tags.clone(),
                created_by: alert.created_by.clone(),
                updated_by: alert.updated_by.clone(),
                space_id: tenant.space_id.clone(),
                namespace: tenant.namespace.clone(),
                params,
                state: previous.alert_type_state,
                started_at,
                previous_started_at: previous.previous_started_at,
                services,
            })
            .await
            .map_err(|err| AlertingError::Executor(format!("{err:#}")))?
            .unwrap_or_else(crate::alert::empty_object);

        let mut fired = instances.take_scheduled();

        if alert.mute_all {
            debug!(
                target: "plugins::alerting",
                fired = fired.len(),
                "alert is muted, skipping actions"
            );
        } else {
            let mut ids: Vec<String> = fired.keys().cloned().collect();
            ids.sort();
            for id in ids {
                if alert.is_instance_muted(&id) {
                    debug!(target: "plugins::alerting", instance_id = %id, "instance is muted, skipping actions");
                    continue;
                }
                let Some(instance) = fired.get_mut(&id) else {
                    continue;
                };
                if instance.is_throttled(alert.throttle, started_at) {
                    debug!(target: "plugins::alerting", instance_id = %id, "instance is throttled, skipping actions");
                    continue;
                }
                self.dispatch(&alert, &tenant, base_path, &id, instance).await?;
                if let Some(group) = instance.scheduled_actions().map(|s| s.group.clone()) {
                    instance.update_last_scheduled_actions(&group, started_at);
                }
            }
        }

        let next = AlertTaskState {
            alert_type_state,
            alert_instances: fired
                .iter()
                .map(|(id, instance)| (id.clone(), instance.to_raw()))
                .collect::<HashMap<_, _>>(),
            previous_started_at: Some(started_at),
        };
        Ok(serde_json::to_value(next)?)
    }

    async fn dispatch(
        &self,
        alert: &crate::alert::Alert,
        tenant: &TenantContext,
        base_path: &str,
        instance_id: &str,
        instance: &AlertInstance,
    ) -> Result<()> {
        let Some(scheduled) = instance.scheduled_actions() else {
            return Ok(());
        };

        for action in alert.actions.iter().filter(|a| a.group == scheduled.group) {
            let vars = ActionTemplateVars {
                alert_id: &alert.id,
                alert_name: &alert.name,
                space_id: &tenant.space_id,
                tags: &alert.tags,
                alert_instance_id: instance_id,
                context: &scheduled.context,
                state: instance.state(),
            };
            let params = self
                .renderer
                .render(&action.params, &vars)
                .map_err(|message| AlertingError::ActionParams {
                    action_id: action.id.clone(),
                    message,
                })?;

            debug!(
                target: "plugins::alerting",
                action_id = %action.id,
                instance_id = %instance_id,
                group = %scheduled.group,
                "executing action"
            );

            self.context
                .actions
                .execute(ExecuteRequest {
                    action_id: action.id.clone(),
                    params,
                    space_id: tenant.space_id.clone(),
                    base_path: base_path.to_string(),
                    api_key: tenant.api_key.clone(),
                })
                .await
                .map_err(|err| {
                    warn!(
                        target: "plugins::alerting",
                        action_id = %err.action_id,
                        "action dispatch failed"
                    );
                    AlertingError::from(err)
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRun for TaskRunner {
    async fn run(&self) -> std::result::Result<TaskRunResult, TaskRunError> {
        TaskRunner::run(self).await.map_err(|failure| TaskRunError {
            message: CredentialRedactor::redact(&failure.error.to_string()),
            run_at: failure.run_at,
        })
    }
}
