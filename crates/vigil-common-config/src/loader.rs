//! Configuration file loading and parsing.

use crate::types::{VigilConfig, MIN_ENCRYPTION_KEY_LEN};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },
}

/// Relative location of the config file inside a project directory.
pub const CONFIG_FILE: &str = ".vigil/config.yaml";

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from `.vigil/config.yaml`, or defaults when the
    /// file does not exist.
    pub fn load(&self) -> Result<VigilConfig, ConfigError> {
        let config_path = self.base_path.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(VigilConfig::default());
        }

        self.load_file(&config_path)
    }

    /// Load configuration from an explicit file, which must exist.
    pub fn load_file(&self, path: &Path) -> Result<VigilConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&contents)?;

        let config: VigilConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        validate(&config)?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

fn env_var_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static env pattern is valid")
    })
}

fn interval_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[1-9][0-9]*[smhd]$").expect("static interval pattern is valid"))
}

/// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
pub fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in env_var_regex().captures_iter(content) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];

        let value = match std::env::var(var_name) {
            Ok(v) => v,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    return Err(ConfigError::EnvVarNotFound {
                        var: var_name.to_string(),
                    })
                }
            },
        };

        result.push_str(&content[last..full_match.start()]);
        result.push_str(&value);
        last = full_match.end();
    }

    result.push_str(&content[last..]);
    Ok(result)
}

fn validate_interval(field: &str, value: &str) -> Result<(), ConfigError> {
    if interval_regex().is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: format!("{field} must look like 10s, 5m, 1h or 1d, got {value:?}"),
        })
    }
}

/// Validate configuration values.
pub fn validate(config: &VigilConfig) -> Result<(), ConfigError> {
    if let Some(key) = &config.encrypted_saved_objects.encryption_key {
        if key.expose().len() < MIN_ENCRYPTION_KEY_LEN {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "encrypted_saved_objects.encryption_key must be at least {MIN_ENCRYPTION_KEY_LEN} characters"
                ),
            });
        }
    }

    if config.server.base_path.ends_with('/') {
        return Err(ConfigError::ValidationError {
            message: "server.base_path must not end with '/'".to_string(),
        });
    }

    validate_interval("task_manager.poll_interval", &config.task_manager.poll_interval)?;
    validate_interval("alerting.default_interval", &config.alerting.default_interval)?;

    Ok(())
}
