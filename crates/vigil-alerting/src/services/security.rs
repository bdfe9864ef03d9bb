//! API key contract.

use crate::tenant::RequestIdentity;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use vigil_common_secret::SecretString;

/// A freshly minted API key.
#[derive(Debug, Clone)]
pub struct CreatedApiKey {
    pub id: String,
    pub api_key: SecretString,
}

/// Security collaborator failure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SecurityError(pub String);

/// Mints and invalidates API keys.
#[async_trait]
pub trait ApiKeyService: Send + Sync {
    /// Mint a key for the requesting user. `None` when the request carries no
    /// user that can own a key.
    async fn create_api_key(
        &self,
        identity: &RequestIdentity,
        name: &str,
    ) -> Result<Option<CreatedApiKey>, SecurityError>;

    async fn invalidate_api_key(&self, id: &str) -> Result<(), SecurityError>;
}

/// Encode a key the way it is stored on an alert: `base64("<id>:<key>")`.
pub fn encode_api_key(key: &CreatedApiKey) -> SecretString {
    SecretString::new(STANDARD.encode(format!("{}:{}", key.id, key.api_key.expose())))
}

/// Id of a stored key, for invalidation.
pub fn api_key_id(encoded: &SecretString) -> Option<String> {
    let decoded = STANDARD.decode(encoded.expose()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    decoded.split_once(':').map(|(id, _)| id.to_string())
}
