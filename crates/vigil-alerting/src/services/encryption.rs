//! Attribute encryption contract.

use super::SavedObject;
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

/// Which attributes of a saved-object type are encrypted, and which are left
/// out of the additional authenticated data.
///
/// Attributes that are neither encrypted nor excluded are bound to the
/// ciphertext: changing any of them without re-encrypting makes decryption
/// fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedTypeRegistration {
    pub object_type: String,
    pub attributes_to_encrypt: BTreeSet<String>,
    pub attributes_to_exclude_from_aad: BTreeSet<String>,
}

impl EncryptedTypeRegistration {
    pub fn new<'a>(
        object_type: &str,
        attributes_to_encrypt: impl IntoIterator<Item = &'a str>,
        attributes_to_exclude_from_aad: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            object_type: object_type.to_string(),
            attributes_to_encrypt: attributes_to_encrypt.into_iter().map(String::from).collect(),
            attributes_to_exclude_from_aad: attributes_to_exclude_from_aad
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Whether `attribute` is part of the additional authenticated data.
    pub fn is_aad_attribute(&self, attribute: &str) -> bool {
        !self.attributes_to_encrypt.contains(attribute)
            && !self.attributes_to_exclude_from_aad.contains(attribute)
    }
}

/// Encryption failures.
#[derive(Debug, Clone, Error)]
pub enum EncryptionError {
    #[error("type \"{0}\" is already registered for encryption")]
    AlreadyRegistered(String),

    #[error("failed to decrypt {object_type} {id}: {message}")]
    Decryption {
        object_type: String,
        id: String,
        message: String,
    },

    #[error("failed to encrypt attribute: {0}")]
    Encryption(String),

    #[error("{object_type} {id} not found")]
    NotFound { object_type: String, id: String },
}

/// Encrypted saved objects.
#[async_trait]
pub trait EncryptedSavedObjects: Send + Sync {
    /// Whether the key was generated at startup and will not survive a
    /// restart.
    fn using_ephemeral_key(&self) -> bool;

    /// Register a type whose attributes are encrypted at rest.
    fn register_type(&self, registration: EncryptedTypeRegistration) -> Result<(), EncryptionError>;

    /// Read an object with its encrypted attributes decrypted, bypassing
    /// user authorization. `namespace` must match the object's namespace.
    async fn get_decrypted_as_internal_user(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<SavedObject, EncryptionError>;
}
