//! Data cluster contract.

use crate::tenant::TenantContext;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Cluster call failure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ClusterError(pub String);

/// A cluster client acting as one tenant.
#[async_trait]
pub trait ScopedClusterClient: Send + Sync {
    /// Call a cluster endpoint with the scoped identity.
    async fn call_as_current_user(&self, endpoint: &str, params: Value) -> Result<Value, ClusterError>;
}

/// Produces tenant-scoped cluster clients.
pub trait ClusterClient: Send + Sync {
    /// Client that authenticates as `tenant` (its credential when present).
    fn as_scoped(&self, tenant: &TenantContext) -> Arc<dyn ScopedClusterClient>;
}
