//! Alerting lifecycle.
//!
//! `setup` subscribes to license updates, registers the `alert` saved-object
//! type for encryption, creates the alert type registry and registers the
//! license-gated routes. `start` binds the task runner factory and the
//! client factory to their collaborators. `stop` drops the license
//! subscription.

use crate::alert::{API_KEY_ATTRIBUTE, ALERT_SAVED_OBJECT_TYPE, ATTRIBUTES_EXCLUDED_FROM_AAD};
use crate::alert_type::{AlertType, RegisteredAlertType};
use crate::client::AlertsClient;
use crate::client_factory::{AlertsClientFactory, AlertsClientFactoryOptions};
use crate::error::{AlertingError, Result};
use crate::gate::{extend_route_with_license_check, with_license_check};
use crate::license::{LicenseCheck, LicenseSource, LicenseState};
use crate::registry::{AlertTypeLister, AlertTypeRegistrar, AlertTypeRegistry};
use crate::routes::{AlertRoute, AlertsClientProvider, RouteRegistrar};
use crate::services::{
    ActionExecutor, ApiKeyService, ClusterClient, EncryptedSavedObjects, EncryptedTypeRegistration,
    SavedObjectsRepository, Spaces, TaskManager,
};
use crate::task_runner::{TaskRunnerContext, TaskRunnerFactory};
use crate::tenant::{RequestIdentity, TenantResolver};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Core services available at setup.
pub struct CoreSetup {
    pub http: Arc<dyn RouteRegistrar>,
    /// Used for action links when no spaces collaborator is present.
    pub server_base_path: String,
}

/// Collaborator plugins available at setup.
pub struct PluginsSetup {
    pub licensing: Arc<dyn LicenseSource>,
    pub encrypted_saved_objects: Arc<dyn EncryptedSavedObjects>,
    pub task_manager: Arc<dyn TaskManager>,
}

/// Core services available at start.
pub struct CoreStart {
    pub saved_objects: Arc<dyn SavedObjectsRepository>,
    pub cluster: Arc<dyn ClusterClient>,
}

/// Collaborator plugins available at start.
pub struct PluginsStart {
    pub actions: Arc<dyn ActionExecutor>,
    pub encrypted_saved_objects: Arc<dyn EncryptedSavedObjects>,
    pub task_manager: Arc<dyn TaskManager>,
    pub spaces: Option<Arc<dyn Spaces>>,
    pub security: Option<Arc<dyn ApiKeyService>>,
}

/// What `setup` hands to other plugins.
#[derive(Clone)]
pub struct PluginSetup {
    registrar: AlertTypeRegistrar,
}

impl PluginSetup {
    pub fn register_type(&self, alert_type: AlertType) -> Result<()> {
        self.registrar.register(alert_type)
    }

    pub fn registrar(&self) -> AlertTypeRegistrar {
        self.registrar.clone()
    }
}

/// What `start` hands to other plugins and to routes.
#[derive(Clone)]
pub struct PluginStart {
    lister: AlertTypeLister,
    client_factory: Arc<AlertsClientFactory>,
    license_state: Arc<LicenseState>,
    using_ephemeral_encryption_key: bool,
}

impl PluginStart {
    pub fn list_types(&self) -> BTreeSet<RegisteredAlertType> {
        self.lister.list()
    }

    /// An alerts client for `identity`.
    ///
    /// Refused while the encryption key is ephemeral, and while the license
    /// does not allow alerting.
    pub fn alerts_client_with_request(&self, identity: &RequestIdentity) -> Result<AlertsClient> {
        if self.using_ephemeral_encryption_key {
            return Err(AlertingError::EphemeralEncryptionKey);
        }
        with_license_check(&self.license_state, || {
            Ok(self.client_factory.create(identity.clone()))
        })
    }

    pub fn check_license(&self) -> LicenseCheck {
        self.license_state.check_license()
    }
}

impl AlertsClientProvider for PluginStart {
    fn alerts_client(&self, identity: &RequestIdentity) -> Result<AlertsClient> {
        self.alerts_client_with_request(identity)
    }

    fn list_alert_types(&self) -> BTreeSet<RegisteredAlertType> {
        self.list_types()
    }
}

/// The alerting plugin.
pub struct AlertingPlugin {
    task_runner_factory: Arc<TaskRunnerFactory>,
    registry: Option<Arc<AlertTypeRegistry>>,
    license_state: Option<Arc<LicenseState>>,
    server_base_path: String,
    using_ephemeral_encryption_key: bool,
}

impl AlertingPlugin {
    pub fn new() -> Self {
        Self {
            task_runner_factory: Arc::new(TaskRunnerFactory::new()),
            registry: None,
            license_state: None,
            server_base_path: String::new(),
            using_ephemeral_encryption_key: false,
        }
    }

    pub fn setup(&mut self, core: CoreSetup, plugins: PluginsSetup) -> Result<PluginSetup> {
        if self.registry.is_some() {
            return Err(AlertingError::Lifecycle("alerting plugin is already set up".to_string()));
        }

        let license_state = Arc::new(LicenseState::new(plugins.licensing.as_ref()));

        self.using_ephemeral_encryption_key = plugins.encrypted_saved_objects.using_ephemeral_key();
        if self.using_ephemeral_encryption_key {
            warn!(
                target: "plugins::alerting",
                "APIs are disabled because the encrypted saved objects plugin uses an ephemeral \
                 encryption key. Set encrypted_saved_objects.encryption_key in the configuration."
            );
        }

        plugins
            .encrypted_saved_objects
            .register_type(EncryptedTypeRegistration::new(
                ALERT_SAVED_OBJECT_TYPE,
                [API_KEY_ATTRIBUTE],
                ATTRIBUTES_EXCLUDED_FROM_AAD,
            ))?;

        let registry = Arc::new(AlertTypeRegistry::new(
            plugins.task_manager,
            Arc::clone(&self.task_runner_factory),
        ));

        for route in AlertRoute::ALL {
            core.http.register(Box::new(extend_route_with_license_check(
                route,
                Arc::clone(&license_state),
            )));
        }

        info!(target: "plugins::alerting", routes = AlertRoute::ALL.len(), "alerting set up");

        self.server_base_path = core.server_base_path;
        self.license_state = Some(license_state);
        self.registry = Some(Arc::clone(&registry));

        Ok(PluginSetup {
            registrar: AlertTypeRegistrar::new(registry),
        })
    }

    pub fn start(&mut self, core: CoreStart, plugins: PluginsStart) -> Result<PluginStart> {
        let (Some(registry), Some(license_state)) = (&self.registry, &self.license_state) else {
            return Err(AlertingError::Lifecycle(
                "alerting plugin must be set up before it is started".to_string(),
            ));
        };

        let tenants = TenantResolver::new(plugins.spaces, self.server_base_path.clone());

        self.task_runner_factory.initialize(TaskRunnerContext {
            tenants: tenants.clone(),
            cluster: core.cluster,
            actions: plugins.actions,
            encrypted_saved_objects: Arc::clone(&plugins.encrypted_saved_objects),
        })?;

        let client_factory = Arc::new(AlertsClientFactory::new(AlertsClientFactoryOptions {
            registry: Arc::clone(registry),
            task_manager: plugins.task_manager,
            saved_objects: core.saved_objects,
            encrypted_saved_objects: plugins.encrypted_saved_objects,
            security: plugins.security,
            tenants,
        }));

        info!(target: "plugins::alerting", alert_types = registry.list().len(), "alerting started");

        Ok(PluginStart {
            lister: AlertTypeLister::new(Arc::clone(registry)),
            client_factory,
            license_state: Arc::clone(license_state),
            using_ephemeral_encryption_key: self.using_ephemeral_encryption_key,
        })
    }

    /// Stop listening for license updates. Gated operations fail closed
    /// afterwards.
    pub fn stop(&mut self) {
        if let Some(license_state) = &self.license_state {
            license_state.clean();
        }
    }
}

impl Default for AlertingPlugin {
    fn default() -> Self {
        Self::new()
    }
}
