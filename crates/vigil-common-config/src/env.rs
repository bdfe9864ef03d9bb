//! Environment variable handling.

use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Environment variable names.
pub mod vars {
    pub const VIGIL_CONFIG_PATH: &str = "VIGIL_CONFIG_PATH";
    pub const VIGIL_ENV: &str = "VIGIL_ENV";
    pub const VIGIL_ENCRYPTION_KEY: &str = "VIGIL_ENCRYPTION_KEY";
}

/// Process environment.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Load `.env`, `.env.local` and `.env.<VIGIL_ENV>` (later files win).
    ///
    /// Missing files are not an error.
    pub fn init() -> Self {
        let _ = dotenvy::from_filename(".env");
        let _ = dotenvy::from_filename(".env.local");

        if let Ok(name) = env::var(vars::VIGIL_ENV) {
            let _ = dotenvy::from_filename(format!(".env.{name}"));
        }

        Self { _guard: () }
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet { var: var.to_string() })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Result<Option<bool>, EnvError> {
        match env::var(var) {
            Ok(v) => match v.to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Some(true)),
                "false" | "0" | "no" => Ok(Some(false)),
                _ => Err(EnvError::InvalidValue {
                    var: var.to_string(),
                    message: "expected a boolean".to_string(),
                }),
            },
            Err(_) => Ok(None),
        }
    }

    /// Config file override, if set.
    pub fn config_path() -> Option<PathBuf> {
        Self::get(vars::VIGIL_CONFIG_PATH).map(PathBuf::from)
    }
}
