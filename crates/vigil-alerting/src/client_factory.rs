//! Per-request alerts clients.

use crate::client::{AlertsClient, ClientServices};
use crate::registry::AlertTypeRegistry;
use crate::services::{ApiKeyService, EncryptedSavedObjects, SavedObjectsRepository, TaskManager};
use crate::tenant::{RequestIdentity, TenantResolver};
use std::sync::Arc;
use tracing::debug;

/// Everything clients are bound to.
pub struct AlertsClientFactoryOptions {
    pub registry: Arc<AlertTypeRegistry>,
    pub task_manager: Arc<dyn TaskManager>,
    pub saved_objects: Arc<dyn SavedObjectsRepository>,
    pub encrypted_saved_objects: Arc<dyn EncryptedSavedObjects>,
    pub security: Option<Arc<dyn ApiKeyService>>,
    pub tenants: TenantResolver,
}

/// Mints [`AlertsClient`]s bound to a request identity.
///
/// The factory performs no gating itself; license and encryption-key checks
/// happen where clients are handed out (`PluginStart`).
pub struct AlertsClientFactory {
    services: ClientServices,
}

impl AlertsClientFactory {
    pub fn new(options: AlertsClientFactoryOptions) -> Self {
        Self {
            services: ClientServices {
                registry: options.registry,
                task_manager: options.task_manager,
                saved_objects: options.saved_objects,
                encrypted_saved_objects: options.encrypted_saved_objects,
                security: options.security,
                tenants: options.tenants,
            },
        }
    }

    pub fn create(&self, identity: RequestIdentity) -> AlertsClient {
        debug!(
            target: "plugins::alerting",
            path = %identity.path,
            principal = ?identity.principal,
            "creating alerts client"
        );
        AlertsClient::new(identity, self.services.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEncryptedStore, MemoryTaskManager, PathSpaces};
    use crate::task_runner::TaskRunnerFactory;

    #[test]
    fn test_client_tenant_follows_identity() {
        let store = Arc::new(MemoryEncryptedStore::ephemeral());
        let tasks = Arc::new(MemoryTaskManager::new());
        let factory = AlertsClientFactory::new(AlertsClientFactoryOptions {
            registry: Arc::new(AlertTypeRegistry::new(tasks.clone(), Arc::new(TaskRunnerFactory::new()))),
            task_manager: tasks,
            saved_objects: store.clone(),
            encrypted_saved_objects: store,
            security: None,
            tenants: TenantResolver::new(Some(Arc::new(PathSpaces::new(""))), ""),
        });

        let marketing = factory.create(RequestIdentity::new("/s/marketing/api/alert").with_principal("ann"));
        let default = factory.create(RequestIdentity::new("/api/alert"));

        let tenant = marketing.tenant().unwrap();
        assert_eq!(tenant.namespace(), Some("marketing"));
        assert_eq!(tenant.principal.as_deref(), Some("ann"));
        assert!(tenant.api_key.is_none());
        assert_eq!(default.tenant().unwrap().namespace(), None);
    }
}
