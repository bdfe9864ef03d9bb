//! Request identity and tenant resolution.
//!
//! A [`TenantContext`] is built directly from a resolved space and the
//! caller (or alert) identity. The same [`TenantResolver`] serves the
//! request path (alerts clients) and the execution path (task runners), so
//! an alert is always written and executed in the same namespace.

use crate::error::{AlertingError, Result};
use crate::services::{Spaces, DEFAULT_SPACE_ID};
use std::sync::Arc;
use tracing::warn;
use vigil_common_secret::SecretString;

/// Who is calling, and on which URL path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Authenticated user, if any.
    pub principal: Option<String>,
    /// Request path including any space prefix (`/s/<space>/api/...`).
    pub path: String,
    /// Fail instead of falling back to the default space when the space
    /// cannot be resolved.
    pub require_isolation: bool,
}

impl RequestIdentity {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            principal: None,
            path: path.into(),
            require_isolation: false,
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn requiring_isolation(mut self) -> Self {
        self.require_isolation = true;
        self
    }
}

/// The tenant an operation runs as.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantContext {
    pub space_id: String,
    /// Storage namespace; `None` is the default namespace.
    pub namespace: Option<String>,
    pub principal: Option<String>,
    /// Credential to act with. Only set on the execution path.
    pub api_key: Option<SecretString>,
}

impl TenantContext {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// `Authorization` header value for the credential, if any.
    pub fn authorization(&self) -> Option<SecretString> {
        self.api_key
            .as_ref()
            .map(|key| SecretString::new(format!("ApiKey {}", key.expose())))
    }
}

/// Space, namespace and base-path resolution shared by clients and runners.
///
/// Without a spaces collaborator every request is in the default space, the
/// default namespace, and the server base path.
#[derive(Clone)]
pub struct TenantResolver {
    spaces: Option<Arc<dyn Spaces>>,
    server_base_path: String,
}

impl TenantResolver {
    pub fn new(spaces: Option<Arc<dyn Spaces>>, server_base_path: impl Into<String>) -> Self {
        Self {
            spaces,
            server_base_path: server_base_path.into(),
        }
    }

    pub fn space_id_to_namespace(&self, space_id: &str) -> Option<String> {
        self.spaces
            .as_ref()
            .and_then(|spaces| spaces.space_id_to_namespace(space_id))
    }

    pub fn base_path(&self, space_id: &str) -> String {
        match &self.spaces {
            Some(spaces) => spaces.get_base_path(space_id),
            None => self.server_base_path.clone(),
        }
    }

    /// Space a request is addressed to.
    ///
    /// An unresolvable space falls back to the default space unless the
    /// identity requires isolation.
    pub fn space_id(&self, identity: &RequestIdentity) -> Result<String> {
        let Some(spaces) = &self.spaces else {
            return Ok(DEFAULT_SPACE_ID.to_string());
        };

        match spaces.get_space_id(identity) {
            Some(space_id) => Ok(space_id),
            None if identity.require_isolation => Err(AlertingError::TenantResolution(format!(
                "no space for request path {}",
                identity.path
            ))),
            None => {
                warn!(
                    target: "plugins::alerting",
                    path = %identity.path,
                    "unable to resolve space, using the default space"
                );
                Ok(DEFAULT_SPACE_ID.to_string())
            }
        }
    }

    /// Tenant of a request. Carries no credential.
    pub fn tenant_for_request(&self, identity: &RequestIdentity) -> Result<TenantContext> {
        let space_id = self.space_id(identity)?;
        Ok(TenantContext {
            namespace: self.space_id_to_namespace(&space_id),
            space_id,
            principal: identity.principal.clone(),
            api_key: None,
        })
    }

    /// Tenant of an alert execution in a stored space.
    pub fn tenant_for_space(
        &self,
        space_id: &str,
        principal: Option<String>,
        api_key: Option<SecretString>,
    ) -> Result<TenantContext> {
        if space_id.is_empty() {
            return Err(AlertingError::TenantResolution(
                "alert task has no space id".to_string(),
            ));
        }
        Ok(TenantContext {
            space_id: space_id.to_string(),
            namespace: self.space_id_to_namespace(space_id),
            principal,
            api_key,
        })
    }
}

impl std::fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantResolver")
            .field("spaces", &self.spaces.is_some())
            .field("server_base_path", &self.server_base_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PathSpaces;

    fn with_spaces() -> TenantResolver {
        TenantResolver::new(Some(Arc::new(PathSpaces::new("/kbn"))), "/kbn")
    }

    #[test]
    fn test_without_spaces_everything_is_default() {
        let resolver = TenantResolver::new(None, "/kbn");
        let tenant = resolver
            .tenant_for_request(&RequestIdentity::new("/s/marketing/api/alert"))
            .unwrap();
        assert_eq!(tenant.space_id, DEFAULT_SPACE_ID);
        assert_eq!(tenant.namespace, None);
        assert_eq!(resolver.base_path("marketing"), "/kbn");
    }

    #[test]
    fn test_space_prefix_selects_namespace() {
        let resolver = with_spaces();
        let tenant = resolver
            .tenant_for_request(&RequestIdentity::new("/kbn/s/marketing/api/alert").with_principal("elastic"))
            .unwrap();
        assert_eq!(tenant.space_id, "marketing");
        assert_eq!(tenant.namespace(), Some("marketing"));
        assert_eq!(tenant.principal.as_deref(), Some("elastic"));
        assert_eq!(resolver.base_path("marketing"), "/kbn/s/marketing");
    }

    #[test]
    fn test_unresolvable_space_falls_back_unless_isolation_required() {
        let resolver = with_spaces();
        let identity = RequestIdentity::new("/elsewhere/api/alert");
        assert_eq!(resolver.space_id(&identity).unwrap(), DEFAULT_SPACE_ID);

        let err = resolver.space_id(&identity.requiring_isolation()).unwrap_err();
        assert!(matches!(err, AlertingError::TenantResolution(_)));
    }

    #[test]
    fn test_empty_stored_space_is_a_resolution_error() {
        let err = with_spaces().tenant_for_space("", None, None).unwrap_err();
        assert!(matches!(err, AlertingError::TenantResolution(_)));
    }

    #[test]
    fn test_authorization_header_from_credential() {
        let tenant = TenantContext {
            space_id: "default".into(),
            namespace: None,
            principal: None,
            api_key: Some(SecretString::from("a2V5")),
        };
        assert_eq!(tenant.authorization().unwrap().expose(), "ApiKey a2V5");
    }
}
