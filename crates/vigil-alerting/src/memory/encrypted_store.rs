//! In-process saved objects store with attribute encryption.
//!
//! Encrypted attributes are sealed with ChaCha20-Poly1305. The additional
//! authenticated data is the canonical JSON of the object's type, id,
//! namespace and every attribute that is neither encrypted nor excluded, so
//! changing any of those without re-encrypting makes decryption fail.

use crate::services::{
    EncryptedSavedObjects, EncryptedTypeRegistration, EncryptionError, FindQuery, FindResponse,
    SavedObject, SavedObjectsError, SavedObjectsRepository,
};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;
use vigil_common_config::EncryptedSavedObjectsConfig;
use vigil_common_secret::{SecretBytes, SecretString};

const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

#[derive(Debug, Clone)]
struct StoredObject {
    id: String,
    object_type: String,
    namespace: Option<String>,
    attributes: Map<String, Value>,
    updated_at: DateTime<Utc>,
    version: u64,
    seq: u64,
}

#[derive(Default)]
struct Objects {
    by_key: HashMap<(String, String), StoredObject>,
    next_seq: u64,
}

/// Saved objects repository and encrypted saved objects service in one.
pub struct MemoryEncryptedStore {
    key: SecretBytes,
    ephemeral: bool,
    registrations: RwLock<HashMap<String, EncryptedTypeRegistration>>,
    objects: RwLock<Objects>,
}

impl MemoryEncryptedStore {
    /// A store whose key is derived from `key`.
    pub fn with_key(key: &SecretString) -> Self {
        let digest = Sha256::digest(key.expose().as_bytes());
        Self::from_key_bytes(digest.to_vec(), false)
    }

    /// A store with a random key that does not survive a restart.
    pub fn ephemeral() -> Self {
        let key: [u8; 32] = rand::random();
        Self::from_key_bytes(key.to_vec(), true)
    }

    pub fn from_config(config: &EncryptedSavedObjectsConfig) -> Self {
        match &config.encryption_key {
            Some(key) => Self::with_key(key),
            None => Self::ephemeral(),
        }
    }

    fn from_key_bytes(key: Vec<u8>, ephemeral: bool) -> Self {
        Self {
            key: SecretBytes::new(key),
            ephemeral,
            registrations: RwLock::new(HashMap::new()),
            objects: RwLock::new(Objects::default()),
        }
    }

    /// Attributes as stored, ciphertext included.
    pub fn raw_attributes(&self, object_type: &str, id: &str) -> Option<Value> {
        self.objects
            .read()
            .by_key
            .get(&(object_type.to_string(), id.to_string()))
            .map(|o| Value::Object(o.attributes.clone()))
    }

    fn registration(&self, object_type: &str) -> Option<EncryptedTypeRegistration> {
        self.registrations.read().get(object_type).cloned()
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, String> {
        ChaCha20Poly1305::new_from_slice(self.key.expose()).map_err(|e| format!("invalid key: {e}"))
    }

    fn seal(&self, plaintext: &Value, aad: &[u8]) -> Result<String, String> {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let msg = serde_json::to_vec(plaintext).map_err(|e| e.to_string())?;
        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: &msg, aad })
            .map_err(|e| format!("encryption failed: {e}"))?;
        Ok(format!(
            "{ENVELOPE_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce_bytes),
            URL_SAFE_NO_PAD.encode(ciphertext)
        ))
    }

    fn open(&self, sealed: &str, aad: &[u8]) -> Result<Value, String> {
        let body = sealed
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| "value is not encrypted".to_string())?;
        let (nonce_b64, ciphertext_b64) = body
            .split_once(':')
            .ok_or_else(|| "malformed envelope".to_string())?;
        let nonce = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|e| format!("invalid nonce: {e}"))?;
        if nonce.len() != NONCE_LEN {
            return Err("invalid nonce length".to_string());
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|e| format!("invalid ciphertext: {e}"))?;
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(&nonce), Payload { msg: &ciphertext, aad })
            .map_err(|_| "authentication failed".to_string())?;
        serde_json::from_slice(&plaintext).map_err(|e| e.to_string())
    }

    /// Encrypt every encrypted attribute present in `attributes` in place,
    /// bound to the current attributes of `object`.
    fn encrypt_attributes(
        &self,
        registration: &EncryptedTypeRegistration,
        object: &StoredObject,
        attributes: &mut Map<String, Value>,
    ) -> Result<(), SavedObjectsError> {
        let aad = additional_authenticated_data(registration, object);
        for name in &registration.attributes_to_encrypt {
            match attributes.get(name) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let sealed = self
                        .seal(value, aad.as_bytes())
                        .map_err(SavedObjectsError::Encryption)?;
                    attributes.insert(name.clone(), Value::String(sealed));
                }
            }
        }
        Ok(())
    }

    fn visible(&self, object: &StoredObject) -> SavedObject {
        let mut attributes = object.attributes.clone();
        if let Some(registration) = self.registration(&object.object_type) {
            for name in &registration.attributes_to_encrypt {
                attributes.remove(name);
            }
        }
        SavedObject {
            id: object.id.clone(),
            object_type: object.object_type.clone(),
            namespace: object.namespace.clone(),
            attributes: Value::Object(attributes),
            updated_at: object.updated_at,
            version: object.version,
        }
    }

    /// Merge, re-encrypt and store under one write guard, so concurrent
    /// updates of the same object are applied one after the other.
    fn apply_update(
        &self,
        object_type: &str,
        id: &str,
        attributes: Value,
        expected_version: Option<u64>,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError> {
        let Value::Object(partial) = attributes else {
            return Err(SavedObjectsError::InvalidAttributes {
                object_type: object_type.to_string(),
            });
        };
        let registration = self.registration(object_type);

        let mut objects = self.objects.write();
        let stored = objects
            .by_key
            .get_mut(&(object_type.to_string(), id.to_string()))
            .filter(|o| o.namespace.as_deref() == namespace)
            .ok_or_else(|| not_found(object_type, id))?;
        if expected_version.is_some_and(|version| version != stored.version) {
            return Err(SavedObjectsError::Conflict {
                object_type: object_type.to_string(),
                id: id.to_string(),
            });
        }

        let mut object = stored.clone();
        object.attributes.extend(partial.clone());
        object.updated_at = Utc::now();
        object.version += 1;

        if let Some(registration) = registration {
            let mut changed: Map<String, Value> = partial
                .into_iter()
                .filter(|(name, _)| registration.attributes_to_encrypt.contains(name))
                .collect();
            self.encrypt_attributes(&registration, &object, &mut changed)?;
            object.attributes.extend(changed);
        }

        *stored = object.clone();
        drop(objects);

        Ok(self.visible(&object))
    }

    fn lookup(&self, object_type: &str, id: &str, namespace: Option<&str>) -> Option<StoredObject> {
        self.objects
            .read()
            .by_key
            .get(&(object_type.to_string(), id.to_string()))
            .filter(|o| o.namespace.as_deref() == namespace)
            .cloned()
    }
}

fn not_found(object_type: &str, id: &str) -> SavedObjectsError {
    SavedObjectsError::NotFound {
        object_type: object_type.to_string(),
        id: id.to_string(),
    }
}

fn additional_authenticated_data(registration: &EncryptedTypeRegistration, object: &StoredObject) -> String {
    let attributes: Map<String, Value> = object
        .attributes
        .iter()
        .filter(|(name, _)| registration.is_aad_attribute(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let mut aad = Map::new();
    aad.insert("type".into(), Value::String(object.object_type.clone()));
    aad.insert("id".into(), Value::String(object.id.clone()));
    aad.insert(
        "namespace".into(),
        object.namespace.clone().map(Value::String).unwrap_or(Value::Null),
    );
    aad.insert("attributes".into(), Value::Object(attributes));

    let mut out = String::new();
    write_canonical(&Value::Object(aad), &mut out);
    out
}

/// JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(key.clone()));
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

fn matches_query(object: &StoredObject, query: &FindQuery) -> bool {
    let filtered = query
        .filter
        .iter()
        .all(|(name, expected)| object.attributes.get(name) == Some(expected));
    if !filtered {
        return false;
    }
    let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = search.to_lowercase();
    let haystack = |value: &Value| {
        value
            .as_str()
            .is_some_and(|s| s.to_lowercase().contains(&needle))
    };
    if query.search_fields.is_empty() {
        object.attributes.values().any(haystack)
    } else {
        query
            .search_fields
            .iter()
            .filter_map(|field| object.attributes.get(field))
            .any(haystack)
    }
}

#[async_trait]
impl SavedObjectsRepository for MemoryEncryptedStore {
    async fn create(
        &self,
        object_type: &str,
        attributes: Value,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError> {
        let Value::Object(attributes) = attributes else {
            return Err(SavedObjectsError::InvalidAttributes {
                object_type: object_type.to_string(),
            });
        };

        let mut object = StoredObject {
            id: uuid::Uuid::new_v4().to_string(),
            object_type: object_type.to_string(),
            namespace: namespace.map(String::from),
            attributes,
            updated_at: Utc::now(),
            version: 1,
            seq: 0,
        };
        if let Some(registration) = self.registration(object_type) {
            let mut attributes = object.attributes.clone();
            self.encrypt_attributes(&registration, &object, &mut attributes)?;
            object.attributes = attributes;
        }

        let mut objects = self.objects.write();
        object.seq = objects.next_seq;
        objects.next_seq += 1;
        objects
            .by_key
            .insert((object.object_type.clone(), object.id.clone()), object.clone());
        drop(objects);

        debug!(target: "plugins::saved_objects", object_type, id = %object.id, "created saved object");
        Ok(self.visible(&object))
    }

    async fn get(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError> {
        self.lookup(object_type, id, namespace)
            .map(|o| self.visible(&o))
            .ok_or_else(|| not_found(object_type, id))
    }

    async fn find(
        &self,
        object_type: &str,
        query: &FindQuery,
        namespace: Option<&str>,
    ) -> Result<FindResponse, SavedObjectsError> {
        let mut matched: Vec<StoredObject> = self
            .objects
            .read()
            .by_key
            .values()
            .filter(|o| o.object_type == object_type && o.namespace.as_deref() == namespace)
            .filter(|o| matches_query(o, query))
            .cloned()
            .collect();
        matched.sort_by_key(|o| o.seq);

        let page = query.page.max(1);
        let saved_objects = matched
            .iter()
            .skip((page - 1).saturating_mul(query.per_page))
            .take(query.per_page)
            .map(|o| self.visible(o))
            .collect();
        Ok(FindResponse {
            page,
            per_page: query.per_page,
            total: matched.len(),
            saved_objects,
        })
    }

    async fn update(
        &self,
        object_type: &str,
        id: &str,
        attributes: Value,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError> {
        self.apply_update(object_type, id, attributes, None, namespace)
    }

    async fn update_at_version(
        &self,
        object_type: &str,
        id: &str,
        attributes: Value,
        version: u64,
        namespace: Option<&str>,
    ) -> Result<SavedObject, SavedObjectsError> {
        self.apply_update(object_type, id, attributes, Some(version), namespace)
    }

    async fn delete(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<(), SavedObjectsError> {
        let mut objects = self.objects.write();
        let key = (object_type.to_string(), id.to_string());
        match objects.by_key.get(&key) {
            Some(o) if o.namespace.as_deref() == namespace => {
                objects.by_key.remove(&key);
                Ok(())
            }
            _ => Err(not_found(object_type, id)),
        }
    }
}

#[async_trait]
impl EncryptedSavedObjects for MemoryEncryptedStore {
    fn using_ephemeral_key(&self) -> bool {
        self.ephemeral
    }

    fn register_type(&self, registration: EncryptedTypeRegistration) -> Result<(), EncryptionError> {
        let mut registrations = self.registrations.write();
        if registrations.contains_key(&registration.object_type) {
            return Err(EncryptionError::AlreadyRegistered(registration.object_type));
        }
        registrations.insert(registration.object_type.clone(), registration);
        Ok(())
    }

    async fn get_decrypted_as_internal_user(
        &self,
        object_type: &str,
        id: &str,
        namespace: Option<&str>,
    ) -> Result<SavedObject, EncryptionError> {
        let object = self
            .lookup(object_type, id, namespace)
            .ok_or_else(|| EncryptionError::NotFound {
                object_type: object_type.to_string(),
                id: id.to_string(),
            })?;

        let mut attributes = object.attributes.clone();
        if let Some(registration) = self.registration(object_type) {
            let aad = additional_authenticated_data(&registration, &object);
            for name in &registration.attributes_to_encrypt {
                let Some(Value::String(sealed)) = object.attributes.get(name) else {
                    continue;
                };
                let value = self
                    .open(sealed, aad.as_bytes())
                    .map_err(|message| EncryptionError::Decryption {
                        object_type: object_type.to_string(),
                        id: id.to_string(),
                        message: format!("unable to decrypt attribute \"{name}\": {message}"),
                    })?;
                attributes.insert(name.clone(), value);
            }
        }

        Ok(SavedObject {
            id: object.id,
            object_type: object.object_type,
            namespace: object.namespace,
            attributes: Value::Object(attributes),
            updated_at: object.updated_at,
            version: object.version,
        })
    }
}
