//! In-process API keys.

use crate::services::{ApiKeyService, CreatedApiKey, SecurityError};
use crate::tenant::RequestIdentity;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use vigil_common_secret::SecretString;

#[derive(Default)]
struct Keys {
    next: u64,
    active: BTreeMap<String, String>,
    invalidated: Vec<String>,
}

/// Mints `key-<n>` API keys for authenticated identities.
#[derive(Default)]
pub struct MemoryApiKeys {
    keys: Mutex<Keys>,
}

impl MemoryApiKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of keys that have not been invalidated.
    pub fn active_keys(&self) -> Vec<String> {
        self.keys.lock().active.keys().cloned().collect()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.keys.lock().invalidated.clone()
    }
}

#[async_trait]
impl ApiKeyService for MemoryApiKeys {
    async fn create_api_key(
        &self,
        identity: &RequestIdentity,
        name: &str,
    ) -> Result<Option<CreatedApiKey>, SecurityError> {
        let Some(principal) = &identity.principal else {
            return Ok(None);
        };
        let mut keys = self.keys.lock();
        keys.next += 1;
        let id = format!("key-{}", keys.next);
        keys.active.insert(id.clone(), format!("{principal}/{name}"));
        Ok(Some(CreatedApiKey {
            api_key: SecretString::new(uuid::Uuid::new_v4().simple().to_string()),
            id,
        }))
    }

    async fn invalidate_api_key(&self, id: &str) -> Result<(), SecurityError> {
        let mut keys = self.keys.lock();
        if keys.active.remove(id).is_none() {
            return Err(SecurityError(format!("api key {id} does not exist")));
        }
        keys.invalidated.push(id.to_string());
        Ok(())
    }
}
