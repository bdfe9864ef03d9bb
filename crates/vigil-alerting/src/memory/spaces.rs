//! URL-prefix spaces.

use crate::services::{Spaces, DEFAULT_SPACE_ID};
use crate::tenant::RequestIdentity;

/// Spaces addressed by a `/s/<space id>` path prefix under the server base
/// path. The default space has no prefix and lives in the default namespace.
#[derive(Debug, Clone)]
pub struct PathSpaces {
    server_base_path: String,
}

impl PathSpaces {
    pub fn new(server_base_path: impl Into<String>) -> Self {
        Self {
            server_base_path: server_base_path.into().trim_end_matches('/').to_string(),
        }
    }

    /// Split an optional `/s/<space id>` prefix off a path relative to the
    /// server base path.
    pub fn split_space_prefix(path: &str) -> (Option<&str>, &str) {
        if let Some(rest) = path.strip_prefix("/s/") {
            let (space_id, remainder) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            if !space_id.is_empty() {
                return (Some(space_id), remainder);
            }
        }
        (None, path)
    }
}

impl Spaces for PathSpaces {
    fn space_id_to_namespace(&self, space_id: &str) -> Option<String> {
        if space_id == DEFAULT_SPACE_ID {
            None
        } else {
            Some(space_id.to_string())
        }
    }

    fn get_space_id(&self, identity: &RequestIdentity) -> Option<String> {
        let relative = identity.path.strip_prefix(self.server_base_path.as_str())?;
        if !relative.is_empty() && !relative.starts_with('/') {
            return None;
        }
        match Self::split_space_prefix(relative) {
            (Some(space_id), _) => Some(space_id.to_string()),
            (None, _) => Some(DEFAULT_SPACE_ID.to_string()),
        }
    }

    fn get_base_path(&self, space_id: &str) -> String {
        if space_id == DEFAULT_SPACE_ID {
            self.server_base_path.clone()
        } else {
            format!("{}/s/{space_id}", self.server_base_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_from_path() {
        let spaces = PathSpaces::new("/kbn/");
        let space = |path: &str| spaces.get_space_id(&RequestIdentity::new(path));

        assert_eq!(space("/kbn/s/ops/api/alert").as_deref(), Some("ops"));
        assert_eq!(space("/kbn/api/alert").as_deref(), Some("default"));
        assert_eq!(space("/kbnx/api/alert"), None);
        assert_eq!(space("/other/api/alert"), None);
    }

    #[test]
    fn test_namespace_and_base_path() {
        let spaces = PathSpaces::new("");
        assert_eq!(spaces.space_id_to_namespace("default"), None);
        assert_eq!(spaces.space_id_to_namespace("ops").as_deref(), Some("ops"));
        assert_eq!(spaces.get_base_path("default"), "");
        assert_eq!(spaces.get_base_path("ops"), "/s/ops");
    }

    #[test]
    fn test_split_space_prefix() {
        assert_eq!(PathSpaces::split_space_prefix("/s/ops/api/alert"), (Some("ops"), "/api/alert"));
        assert_eq!(PathSpaces::split_space_prefix("/s/ops"), (Some("ops"), ""));
        assert_eq!(PathSpaces::split_space_prefix("/api/alert"), (None, "/api/alert"));
    }
}
