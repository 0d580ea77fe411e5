//! Configuration parsing and validation for guardiand
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service settings (socket, data dir, store backend, rate limit)
//! - Parent accounts, children roster and app catalog seed
//! - Optional policy, alert, screen-time and install seeds
//! - Validation with clear error messages

mod config;
mod schema;
mod validation;

pub use config::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServiceConfig> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<ServiceConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        warn!(count = errors.len(), "Configuration failed validation");
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(ServiceConfig::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_api::{AlertType, SafetyBadge};
    use guardian_util::{AppId, ChildId, ParentId};
    use std::io::Write;

    const EXAMPLE: &str = include_str!("../../../config.example.toml");

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1

            [[parents]]
            id = 1
            username = "sarah.johnson"
            email = "sarah.johnson@email.com"
            password = "password123"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.parents.len(), 1);
        assert!(config.children.is_empty());
        assert_eq!(config.service.store, StoreBackend::Memory);
        assert_eq!(config.service.max_requests_per_second, DEFAULT_MAX_REQUESTS_PER_SECOND);
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_out_of_range_policy_seed() {
        let config = r#"
            config_version = 1

            [[parents]]
            id = 1
            username = "sarah.johnson"
            email = "sarah.johnson@email.com"
            password = "password123"

            [[children]]
            id = 1
            parent_id = 1
            name = "Emma Johnson"
            age = 8

            [[policies]]
            parent_id = 1
            child_id = 1
            daily_screen_time_limit = 600
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 1),
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse_config(EXAMPLE).unwrap();

        let sarah = config.find_parent("sarah.johnson").unwrap();
        assert!(sarah.verify_password("password123"));
        assert!(!sarah.verify_password("password"));
        assert_eq!(sarah.profile().email, "sarah.johnson@email.com");

        assert_eq!(config.children[0].name, "Emma Johnson");
        assert_eq!(config.apps.len(), 5);
        let tiktok = config.apps.iter().find(|a| a.id == AppId::new(4)).unwrap();
        assert_eq!(tiktok.safety_badge, SafetyBadge::HighRisk);

        let policy = &config.policies[0];
        assert_eq!(policy.parent_id, ParentId::new(1));
        assert_eq!(policy.child_id, ChildId::new(1));
        assert!(policy.auto_block_high_risk);
        assert!(policy.updated_at.is_some());

        assert_eq!(config.alerts.len(), 3);
        assert_eq!(config.alerts[2].alert.alert_type, AlertType::HighRisk);
        assert_eq!(config.alerts[2].alert.metadata["appName"], "TikTok");
        assert_eq!(config.installs.len(), 4);
        assert_eq!(config.screen_time.len(), 3);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            config_version = 1

            [service]
            store = "sqlite"
            data_dir = "/tmp/guardian-test"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.service.store, StoreBackend::Sqlite);
        assert_eq!(
            config.service.data_dir,
            std::path::PathBuf::from("/tmp/guardian-test")
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
