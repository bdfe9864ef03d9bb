//! Canned cluster responses.

use crate::services::{ClusterClient, ClusterError, ScopedClusterClient};
use crate::tenant::TenantContext;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One recorded cluster call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterCall {
    pub endpoint: String,
    pub params: Value,
    pub space_id: String,
    pub namespace: Option<String>,
    /// Whether the call carried a credential.
    pub authenticated: bool,
}

#[derive(Default)]
struct Shared {
    responses: HashMap<String, Value>,
    calls: Vec<ClusterCall>,
}

/// Cluster client answering from a fixed endpoint table.
#[derive(Clone, Default)]
pub struct StaticClusterClient {
    shared: Arc<Mutex<Shared>>,
}

impl StaticClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, endpoint: &str, response: Value) -> Self {
        self.shared.lock().responses.insert(endpoint.to_string(), response);
        self
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.shared.lock().calls.clone()
    }
}

struct ScopedStaticClient {
    shared: Arc<Mutex<Shared>>,
    tenant: TenantContext,
}

#[async_trait]
impl ScopedClusterClient for ScopedStaticClient {
    async fn call_as_current_user(&self, endpoint: &str, params: Value) -> Result<Value, ClusterError> {
        let mut shared = self.shared.lock();
        shared.calls.push(ClusterCall {
            endpoint: endpoint.to_string(),
            params,
            space_id: self.tenant.space_id.clone(),
            namespace: self.tenant.namespace.clone(),
            authenticated: self.tenant.authorization().is_some(),
        });
        shared
            .responses
            .get(endpoint)
            .cloned()
            .ok_or_else(|| ClusterError(format!("no response for endpoint {endpoint}")))
    }
}

impl ClusterClient for StaticClusterClient {
    fn as_scoped(&self, tenant: &TenantContext) -> Arc<dyn ScopedClusterClient> {
        Arc::new(ScopedStaticClient {
            shared: Arc::clone(&self.shared),
            tenant: tenant.clone(),
        })
    }
}
