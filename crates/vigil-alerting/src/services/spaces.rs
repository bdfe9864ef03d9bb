//! Spaces (multi-tenancy) contract.

use crate::tenant::RequestIdentity;

/// Id of the space requests land in when they name none.
pub const DEFAULT_SPACE_ID: &str = "default";

/// Maps requests and space ids onto storage namespaces and URL base paths.
pub trait Spaces: Send + Sync {
    /// Storage namespace of a space. `None` is the default namespace.
    fn space_id_to_namespace(&self, space_id: &str) -> Option<String>;

    /// Space a request is addressed to, or `None` when it cannot be
    /// determined.
    fn get_space_id(&self, identity: &RequestIdentity) -> Option<String>;

    /// URL base path of a space.
    fn get_base_path(&self, space_id: &str) -> String;
}
