//! Space-scoped alerts client.
//!
//! Every operation re-derives the caller's tenant from the bound request
//! identity; there is no way to pass a namespace in. A client created for
//! one space cannot see alerts of another, even by id.

use crate::alert::{
    Alert, AlertTaskState, CreateAlertData, DecryptedAlert, FindOptions, FindResult,
    NewAlertAttributes, UpdateAlertData, ALERT_SAVED_OBJECT_TYPE,
};
use crate::alert_type::RegisteredAlertType;
use crate::error::{AlertingError, Result};
use crate::registry::{task_type_for, AlertTypeRegistry};
use crate::services::{
    api_key_id, encode_api_key, ApiKeyService, EncryptedSavedObjects, FindQuery,
    SavedObjectsError, SavedObjectsRepository, TaskManager, TaskManagerError, TaskSpec,
};
use crate::tenant::{RequestIdentity, TenantContext, TenantResolver};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use vigil_common_log::spans::client_span;
use vigil_common_secret::SecretString;

/// Name given to API keys minted for alerts.
const API_KEY_NAME: &str = "vigil-alerting";

/// Re-reads allowed when a versioned write loses a race.
const MAX_CONFLICT_RETRIES: usize = 10;

/// Collaborators an [`AlertsClient`] works through.
#[derive(Clone)]
pub(crate) struct ClientServices {
    pub registry: Arc<AlertTypeRegistry>,
    pub task_manager: Arc<dyn TaskManager>,
    pub saved_objects: Arc<dyn SavedObjectsRepository>,
    pub encrypted_saved_objects: Arc<dyn EncryptedSavedObjects>,
    pub security: Option<Arc<dyn ApiKeyService>>,
    pub tenants: TenantResolver,
}

/// Manages alerts on behalf of one request identity.
pub struct AlertsClient {
    identity: RequestIdentity,
    services: ClientServices,
}

impl AlertsClient {
    pub(crate) fn new(identity: RequestIdentity, services: ClientServices) -> Self {
        Self { identity, services }
    }

    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Tenant of the bound identity, resolved afresh.
    pub fn tenant(&self) -> Result<TenantContext> {
        self.services.tenants.tenant_for_request(&self.identity)
    }

    /// Create an alert, scheduling it when enabled.
    ///
    /// If scheduling fails the stored alert is removed again.
    pub async fn create(&self, data: CreateAlertData) -> Result<Alert> {
        let tenant = self.tenant()?;
        self.create_in(&tenant, data)
            .instrument(client_span("create", &tenant.space_id))
            .await
    }

    async fn create_in(&self, tenant: &TenantContext, data: CreateAlertData) -> Result<Alert> {
        let alert_type = self.services.registry.get(&data.alert_type_id)?;
        let params = alert_type.validate_params(&data.params)?;
        self.check_action_groups(&alert_type.id, &data.actions)?;

        let api_key = if data.enabled { self.create_api_key().await? } else { None };
        let principal = tenant.principal.as_deref();
        let now = Utc::now();

        let attributes = NewAlertAttributes {
            name: &data.name,
            tags: &data.tags,
            alert_type_id: &data.alert_type_id,
            interval: data.interval,
            throttle: data.throttle,
            params: &params,
            actions: &data.actions,
            enabled: data.enabled,
            api_key: api_key.as_ref().map(|k| k.expose().as_str()),
            api_key_owner: api_key.as_ref().and(principal),
            created_by: principal,
            updated_by: principal,
            created_at: now,
            updated_at: now,
            scheduled_task_id: None,
            mute_all: false,
            muted_instance_ids: &[],
        };

        let created = self
            .services
            .saved_objects
            .create(ALERT_SAVED_OBJECT_TYPE, serde_json::to_value(&attributes)?, tenant.namespace())
            .await?;

        if !data.enabled {
            return Alert::from_saved_object(created);
        }

        let task_id = match self.schedule_task(&created.id, &data.alert_type_id, tenant).await {
            Ok(task_id) => task_id,
            Err(err) => {
                if let Err(cleanup) = self
                    .services
                    .saved_objects
                    .delete(ALERT_SAVED_OBJECT_TYPE, &created.id, tenant.namespace())
                    .await
                {
                    warn!(
                        target: "plugins::alerting",
                        alert_id = %created.id,
                        error = %cleanup,
                        "failed to remove alert after scheduling failed"
                    );
                }
                self.invalidate_api_key(api_key.as_ref()).await;
                return Err(err);
            }
        };

        let updated = self
            .services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                &created.id,
                json!({ "scheduledTaskId": task_id }),
                tenant.namespace(),
            )
            .await?;
        debug!(target: "plugins::alerting", alert_id = %updated.id, task_id = %task_id, "created alert");
        Alert::from_saved_object(updated)
    }

    pub async fn get(&self, id: &str) -> Result<Alert> {
        let tenant = self.tenant()?;
        self.get_in(&tenant, id).await
    }

    async fn get_in(&self, tenant: &TenantContext, id: &str) -> Result<Alert> {
        let object = self
            .services
            .saved_objects
            .get(ALERT_SAVED_OBJECT_TYPE, id, tenant.namespace())
            .await?;
        Alert::from_saved_object(object)
    }

    /// State of the alert's task, `None` when it has no task (disabled) or
    /// the task is gone.
    pub async fn get_alert_state(&self, id: &str) -> Result<Option<AlertTaskState>> {
        let alert = self.get(id).await?;
        let Some(task_id) = alert.scheduled_task_id else {
            return Ok(None);
        };
        match self.services.task_manager.get(&task_id).await {
            Ok(task) => Ok(Some(AlertTaskState::from_task_state(&task.state)?)),
            Err(TaskManagerError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find(&self, options: FindOptions) -> Result<FindResult> {
        let tenant = self.tenant()?;
        if options.page == 0 || options.per_page == 0 {
            return Err(AlertingError::BadRequest(
                "page and per_page must be greater than 0".to_string(),
            ));
        }

        let mut query = FindQuery {
            page: options.page,
            per_page: options.per_page,
            search: options.search,
            search_fields: vec!["name".to_string()],
            filter: Vec::new(),
        };
        if let Some(alert_type_id) = options.alert_type_id {
            query.filter.push(("alertTypeId".to_string(), Value::String(alert_type_id)));
        }

        let response = self
            .services
            .saved_objects
            .find(ALERT_SAVED_OBJECT_TYPE, &query, tenant.namespace())
            .await?;

        Ok(FindResult {
            page: response.page,
            per_page: response.per_page,
            total: response.total,
            data: response
                .saved_objects
                .into_iter()
                .map(Alert::from_saved_object)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Delete an alert, its task and its API key.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.delete_in(&tenant, id)
            .instrument(client_span("delete", &tenant.space_id))
            .await
    }

    async fn delete_in(&self, tenant: &TenantContext, id: &str) -> Result<()> {
        let (alert, api_key) = self.get_with_api_key(tenant, id).await?;

        self.services
            .saved_objects
            .delete(ALERT_SAVED_OBJECT_TYPE, id, tenant.namespace())
            .await?;

        if let Some(task_id) = &alert.scheduled_task_id {
            self.remove_task(task_id).await?;
        }
        self.invalidate_api_key(api_key.as_ref()).await;
        Ok(())
    }

    /// Replace an alert's definition. Enabled alerts get a fresh API key.
    pub async fn update(&self, id: &str, data: UpdateAlertData) -> Result<Alert> {
        let tenant = self.tenant()?;
        self.update_in(&tenant, id, data)
            .instrument(client_span("update", &tenant.space_id))
            .await
    }

    async fn update_in(&self, tenant: &TenantContext, id: &str, data: UpdateAlertData) -> Result<Alert> {
        let (existing, old_api_key) = self.get_with_api_key(tenant, id).await?;
        let alert_type = self.services.registry.get(&existing.alert_type_id)?;
        let params = alert_type.validate_params(&data.params)?;
        self.check_action_groups(&alert_type.id, &data.actions)?;

        let api_key = if existing.enabled { self.create_api_key().await? } else { None };
        let principal = tenant.principal.clone();

        let updated = self
            .services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                id,
                json!({
                    "name": data.name,
                    "tags": data.tags,
                    "interval": data.interval,
                    "throttle": data.throttle,
                    "params": params,
                    "actions": data.actions,
                    "apiKey": api_key.as_ref().map(|k| k.expose().clone()),
                    "apiKeyOwner": api_key.as_ref().and(principal.clone()),
                    "updatedBy": principal,
                    "updatedAt": Utc::now(),
                }),
                tenant.namespace(),
            )
            .await?;

        self.invalidate_api_key(old_api_key.as_ref()).await;
        Alert::from_saved_object(updated)
    }

    /// Replace an alert's API key with one owned by the caller.
    pub async fn update_api_key(&self, id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.update_api_key_in(&tenant, id)
            .instrument(client_span("update_api_key", &tenant.space_id))
            .await
    }

    async fn update_api_key_in(&self, tenant: &TenantContext, id: &str) -> Result<()> {
        let (_, old_api_key) = self.get_with_api_key(tenant, id).await?;
        let api_key = self.create_api_key().await?;
        let principal = tenant.principal.clone();

        self.services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                id,
                json!({
                    "apiKey": api_key.as_ref().map(|k| k.expose().clone()),
                    "apiKeyOwner": api_key.as_ref().and(principal.clone()),
                    "updatedBy": principal,
                    "updatedAt": Utc::now(),
                }),
                tenant.namespace(),
            )
            .await?;

        self.invalidate_api_key(old_api_key.as_ref()).await;
        Ok(())
    }

    /// Schedule a disabled alert.
    pub async fn enable(&self, id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.enable_in(&tenant, id)
            .instrument(client_span("enable", &tenant.space_id))
            .await
    }

    async fn enable_in(&self, tenant: &TenantContext, id: &str) -> Result<()> {
        let (alert, old_api_key) = self.get_with_api_key(tenant, id).await?;
        if alert.enabled {
            return Ok(());
        }

        let api_key = self.create_api_key().await?;
        let task_id = self.schedule_task(id, &alert.alert_type_id, tenant).await?;
        let principal = tenant.principal.clone();

        let result = self
            .services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                id,
                json!({
                    "enabled": true,
                    "apiKey": api_key.as_ref().map(|k| k.expose().clone()),
                    "apiKeyOwner": api_key.as_ref().and(principal.clone()),
                    "updatedBy": principal,
                    "updatedAt": Utc::now(),
                    "scheduledTaskId": task_id,
                }),
                tenant.namespace(),
            )
            .await;

        if let Err(err) = result {
            // The alert would never learn about this task.
            if let Err(remove) = self.services.task_manager.remove(&task_id).await {
                warn!(target: "plugins::alerting", task_id = %task_id, error = %remove, "failed to remove orphaned task");
            }
            self.invalidate_api_key(api_key.as_ref()).await;
            return Err(err.into());
        }

        self.invalidate_api_key(old_api_key.as_ref()).await;
        Ok(())
    }

    /// Unschedule an alert and drop its API key.
    pub async fn disable(&self, id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.disable_in(&tenant, id)
            .instrument(client_span("disable", &tenant.space_id))
            .await
    }

    async fn disable_in(&self, tenant: &TenantContext, id: &str) -> Result<()> {
        let (alert, old_api_key) = self.get_with_api_key(tenant, id).await?;
        if !alert.enabled {
            return Ok(());
        }

        self.services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                id,
                json!({
                    "enabled": false,
                    "scheduledTaskId": null,
                    "apiKey": null,
                    "apiKeyOwner": null,
                    "updatedBy": tenant.principal,
                    "updatedAt": Utc::now(),
                }),
                tenant.namespace(),
            )
            .await?;

        if let Some(task_id) = &alert.scheduled_task_id {
            self.remove_task(task_id).await?;
        }
        self.invalidate_api_key(old_api_key.as_ref()).await;
        Ok(())
    }

    /// Suppress every action of the alert.
    pub async fn mute_all(&self, id: &str) -> Result<()> {
        self.set_mute_all(id, true).await
    }

    pub async fn unmute_all(&self, id: &str) -> Result<()> {
        self.set_mute_all(id, false).await
    }

    async fn set_mute_all(&self, id: &str, mute_all: bool) -> Result<()> {
        let tenant = self.tenant()?;
        self.get_in(&tenant, id).await?;
        self.services
            .saved_objects
            .update(
                ALERT_SAVED_OBJECT_TYPE,
                id,
                json!({
                    "muteAll": mute_all,
                    "mutedInstanceIds": [],
                    "updatedBy": tenant.principal,
                }),
                tenant.namespace(),
            )
            .await?;
        Ok(())
    }

    /// Suppress actions of one instance. Muting twice is a no-op.
    pub async fn mute_instance(&self, alert_id: &str, instance_id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.update_muted_instances(&tenant, alert_id, |alert| {
            if alert.mute_all || alert.muted_instance_ids.iter().any(|id| id == instance_id) {
                return None;
            }
            let mut muted = alert.muted_instance_ids.clone();
            muted.push(instance_id.to_string());
            Some(muted)
        })
        .instrument(client_span("mute_instance", &tenant.space_id))
        .await
    }

    pub async fn unmute_instance(&self, alert_id: &str, instance_id: &str) -> Result<()> {
        let tenant = self.tenant()?;
        self.update_muted_instances(&tenant, alert_id, |alert| {
            if alert.mute_all || !alert.muted_instance_ids.iter().any(|id| id == instance_id) {
                return None;
            }
            Some(
                alert
                    .muted_instance_ids
                    .iter()
                    .filter(|id| *id != instance_id)
                    .cloned()
                    .collect(),
            )
        })
        .instrument(client_span("unmute_instance", &tenant.space_id))
        .await
    }

    /// Rewrite the muted instance list with `change`, which returns `None`
    /// when there is nothing to do. The write only lands on the version that
    /// was read; on a concurrent change the alert is re-read and `change`
    /// applied again.
    async fn update_muted_instances(
        &self,
        tenant: &TenantContext,
        alert_id: &str,
        change: impl Fn(&Alert) -> Option<Vec<String>> + Send,
    ) -> Result<()> {
        let mut conflicts = 0;
        loop {
            let object = self
                .services
                .saved_objects
                .get(ALERT_SAVED_OBJECT_TYPE, alert_id, tenant.namespace())
                .await?;
            let version = object.version;
            let alert = Alert::from_saved_object(object)?;
            let Some(muted) = change(&alert) else {
                return Ok(());
            };

            let result = self
                .services
                .saved_objects
                .update_at_version(
                    ALERT_SAVED_OBJECT_TYPE,
                    alert_id,
                    json!({
                        "mutedInstanceIds": muted,
                        "updatedBy": tenant.principal,
                    }),
                    version,
                    tenant.namespace(),
                )
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(SavedObjectsError::Conflict { .. }) if conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    debug!(target: "plugins::alerting", alert_id, conflicts, "muted instances changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn list_alert_types(&self) -> BTreeSet<RegisteredAlertType> {
        self.services.registry.list()
    }

    fn check_action_groups(&self, alert_type_id: &str, actions: &[crate::alert::AlertAction]) -> Result<()> {
        let alert_type = self.services.registry.get(alert_type_id)?;
        match actions.iter().find(|a| !alert_type.has_action_group(&a.group)) {
            Some(action) => Err(AlertingError::BadRequest(format!(
                "action {} uses group \"{}\" which alert type {} does not declare",
                action.id, action.group, alert_type_id
            ))),
            None => Ok(()),
        }
    }

    /// The alert, plus its API key when it can be decrypted.
    ///
    /// The plain read runs first so a missing or foreign alert is reported
    /// as not found. A decryption failure only costs the key invalidation.
    async fn get_with_api_key(
        &self,
        tenant: &TenantContext,
        id: &str,
    ) -> Result<(Alert, Option<SecretString>)> {
        let alert = self.get_in(tenant, id).await?;
        match self
            .services
            .encrypted_saved_objects
            .get_decrypted_as_internal_user(ALERT_SAVED_OBJECT_TYPE, id, tenant.namespace())
            .await
        {
            Ok(object) => Ok((alert, DecryptedAlert::from_saved_object(object)?.api_key)),
            Err(err) => {
                warn!(
                    target: "plugins::alerting",
                    alert_id = %id,
                    error = %err,
                    "unable to decrypt alert api key, it will not be invalidated"
                );
                Ok((alert, None))
            }
        }
    }

    async fn schedule_task(
        &self,
        alert_id: &str,
        alert_type_id: &str,
        tenant: &TenantContext,
    ) -> Result<String> {
        let task = self
            .services
            .task_manager
            .schedule(TaskSpec {
                task_type: task_type_for(alert_type_id),
                params: json!({ "alertId": alert_id, "spaceId": tenant.space_id }),
                state: serde_json::to_value(AlertTaskState::default())?,
                scope: vec!["alerting".to_string()],
            })
            .await?;
        Ok(task.id)
    }

    async fn remove_task(&self, task_id: &str) -> Result<()> {
        match self.services.task_manager.remove(task_id).await {
            Ok(()) | Err(TaskManagerError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_api_key(&self) -> Result<Option<SecretString>> {
        let Some(security) = &self.services.security else {
            return Ok(None);
        };
        let created = security.create_api_key(&self.identity, API_KEY_NAME).await?;
        Ok(created.as_ref().map(encode_api_key))
    }

    /// Best-effort: failures are logged, never returned.
    async fn invalidate_api_key(&self, api_key: Option<&SecretString>) {
        let (Some(security), Some(api_key)) = (&self.services.security, api_key) else {
            return;
        };
        let Some(id) = api_key_id(api_key) else {
            warn!(target: "plugins::alerting", "stored api key is malformed, not invalidating");
            return;
        };
        if let Err(err) = security.invalidate_api_key(&id).await {
            warn!(
                target: "plugins::alerting",
                api_key_id = %id,
                error = %err,
                "failed to invalidate api key"
            );
        }
    }
}

impl std::fmt::Debug for AlertsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertsClient")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
