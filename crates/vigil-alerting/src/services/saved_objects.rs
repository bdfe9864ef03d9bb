//! Saved objects repository contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// A stored object as returned to callers.
///
/// Encrypted attributes are never present on objects returned by
/// [`SavedObjectsRepository`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedObject {
    pub id: String,
    pub object_type: String,
    pub namespace: Option<String>,
    pub attributes: Value,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write.
    pub version: u64,
}

/// Query for [`SavedObjectsRepository::find`].
#[derive(Debug, Clone)]
pub struct FindQuery {
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
    /// Case-insensitive substring matched against `search_fields`.
    pub search: Option<String>,
    pub search_fields: Vec<String>,
    /// Attribute equality filters, all of which must match.
    pub filter: Vec<(String, Value)>,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            search: None,
            search_fields: Vec::new(),
            filter: Vec::new(),
        }
    }
}

/// One page of [`SavedObjectsRepository::find`] results.
#[derive(Debug, Clone)]
pub struct FindResponse {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub saved_objects: Vec<SavedObject>,
}

/// Repository errors.
#[derive(Debug, Clone, Error)]
pub enum SavedObjectsError {
    #[error("{object_type} {id} not found")]
    NotFound { object_type: String, id: String },

    #[error("{object_type} {id} was changed by another request")]
    Conflict { object_type: String, id: String },

    #[error("attributes of {object_type} must be a JSON object")]
    InvalidAttributes { object_type: String },

    #[error("failed to encrypt attributes: {0}")]
    Encryption(String),

    #[error("{0}")]
    Backend(String),
}

/// Namespace-scoped object storage.
///
/// Every call carries the caller's namespace (`None` for the default
/// namespace). An object is only visible to calls made with the namespace it
/// was created in.
#[async_trait]
pub trait SavedObjectsRepository: Send + Sync {
    async fn create(
        &self,
        object_type: &str,
        attributes: Value,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError>;

    async fn get(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError>;

    async fn find(
        &self,
        object_type: &str,
        query: &FindQuery,
        namespace: Option<&str>,
    ) -> Result<FindResponse, SavedObjectsError>;

    /// Merge `attributes` into the stored attributes and return the result.
    async fn update(
        &self,
        object_type: &str,
        id: &str,
        attributes: Value,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError>;

    /// Like [`update`](Self::update), but fails with
    /// [`SavedObjectsError::Conflict`] unless the stored object is still at
    /// `version`.
    async fn update_at_version(
        &self,
        object_type: &str,
        id: &str,
        attributes: Value,
        version: u64,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError>;

    async fn delete(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<(), SavedObjectsError>;
}
