//! Configuration types for Vigil.
//!
//! This crate provides the configuration read from `.vigil/config.yaml`
//! by the alerting daemon.

pub mod env;
pub mod loader;
pub mod types;

pub use env::*;
pub use loader::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_sensible_values() {
        let config = VigilConfig::default();

        assert_eq!(config.server.base_path, "");
        assert!(config.encrypted_saved_objects.encryption_key.is_none());
        assert_eq!(config.task_manager.poll_interval, "3s");
        assert_eq!(config.alerting.default_interval, "1m");
        assert_eq!(config.alerting.default_space, "default");
    }

    #[test]
    fn test_encryption_key_is_redacted_when_serialized() {
        let mut config = VigilConfig::default();
        config.encrypted_saved_objects.encryption_key =
            Some("0123456789abcdef0123456789abcdef".into());
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("[REDACTED]"));
        assert!(!yaml.contains("0123456789abcdef"));
    }
}
