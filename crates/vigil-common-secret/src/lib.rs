//! Credential and key handling.
//!
//! Alert credentials (API keys) and encryption keys travel through the
//! alerting core wrapped in [`Secret`], which never prints or serializes its
//! contents. [`CredentialRedactor`] scrubs credentials that end up inside
//! free-form strings such as collaborator error messages before they reach a
//! log line.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Marker written in place of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// A secret value that is redacted in logs, debug output and serialization.
///
/// # Example
///
/// ```rust
/// use vigil_common_secret::SecretString;
///
/// let api_key = SecretString::new("a2V5LWlkOnNlY3JldA==".to_string());
/// assert_eq!(api_key.to_string(), "[REDACTED]");
/// assert_eq!(format!("{:?}", api_key), "Secret([REDACTED])");
/// assert_eq!(api_key.expose(), "a2V5LWlkOnNlY3JldA==");
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the secret value.
    ///
    /// Every call site is a place the credential leaves its wrapper; keep
    /// them few.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize + Default> Secret<T> {
    /// Consume the wrapper and return the value.
    ///
    /// The wrapper's own storage is replaced by `T::default()` before it is
    /// zeroized on drop.
    pub fn into_inner(mut self) -> T {
        std::mem::take(&mut self.0)
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl<T: Zeroize + PartialEq> PartialEq for Secret<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Zeroize + Eq> Eq for Secret<T> {}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

// Deserialize normally so configuration files can carry keys; serialize as
// the redaction marker so a secret never round-trips into output.
impl<'de, T: Zeroize + Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Secret::new)
    }
}

impl<T: Zeroize + Serialize> Serialize for Secret<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        REDACTED.serialize(serializer)
    }
}

/// A secret string, e.g. an encoded API key.
pub type SecretString = Secret<String>;

/// Secret key material.
pub type SecretBytes = Secret<Vec<u8>>;

/// Scrubs credentials out of free-form text.
pub struct CredentialRedactor;

impl CredentialRedactor {
    /// Whether the text carries an `Authorization`-style credential.
    pub fn contains_credential(s: &str) -> bool {
        header_regex().is_match(s) || api_key_field_regex().is_match(s)
    }

    /// Replace credentials in `s` with [`REDACTED`].
    ///
    /// Handles `ApiKey <token>` / `Bearer <token>` / `Basic <token>` header
    /// values and JSON-ish `"apiKey": "<token>"` fields.
    pub fn redact(s: &str) -> String {
        let scrubbed = header_regex().replace_all(s, format!("${{scheme}} {REDACTED}"));
        api_key_field_regex()
            .replace_all(&scrubbed, format!("${{field}}\"{REDACTED}\""))
            .into_owned()
    }
}

fn header_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)(?P<scheme>apikey|bearer|basic)\s+[A-Za-z0-9+/=._~-]{8,}")
            .expect("static header pattern is valid")
    })
}

fn api_key_field_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r#"(?P<field>"(?:apiKey|api_key)"\s*:\s*)"[^"]*""#)
            .expect("static field pattern is valid")
    })
}
