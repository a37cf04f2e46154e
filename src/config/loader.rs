//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let path = temp_config(
            "backstop_loader_minimal.toml",
            r#"
            [listener]
            bind_address = "127.0.0.1:9999"

            [circuit_breaker]
            max_failures = 2
            "#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
        assert_eq!(config.circuit_breaker.max_failures, 2);
        // Untouched sections keep their defaults.
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 30);
        assert_eq!(config.rate_limit.burst, 20);
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let path = temp_config("backstop_loader_malformed.toml", "listener = [broken");
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
        fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn validation_errors_join_in_display() {
        let error = ConfigError::Validation(vec![
            ValidationError {
                field: "rate_limit.burst",
                message: "must be at least 1".to_string(),
            },
            ValidationError {
                field: "circuit_breaker.max_failures",
                message: "must be at least 1".to_string(),
            },
        ]);
        assert_eq!(
            error.to_string(),
            "Validation failed: rate_limit.burst: must be at least 1, \
             circuit_breaker.max_failures: must be at least 1"
        );
    }

    #[test]
    fn semantic_violations_are_reported() {
        let path = temp_config(
            "backstop_loader_invalid.toml",
            r#"
            [rate_limit]
            burst = 0
            "#,
        );
        match load_config(&path) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.field == "rate_limit.burst"));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
        fs::remove_file(path).unwrap_or_default();
    }
}
