//! Semantic configuration checks.
//!
//! Serde handles the syntactic layer; everything here is a constraint the
//! type system cannot express (positive thresholds, parseable addresses,
//! known log levels). All violations are collected so the operator sees the
//! full list in one pass.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single failed semantic check.
#[derive(Debug, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a loaded configuration, collecting every violation.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address",
            message: format!("not a valid socket address: {}", config.listener.bind_address),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError {
            field: "timeouts.request_secs",
            message: "must be at least 1".to_string(),
        });
    }

    let breaker = &config.circuit_breaker;
    if breaker.max_failures == 0 {
        errors.push(ValidationError {
            field: "circuit_breaker.max_failures",
            message: "must be at least 1".to_string(),
        });
    }
    if breaker.max_half_open_probes == 0 {
        errors.push(ValidationError {
            field: "circuit_breaker.max_half_open_probes",
            message: "must be at least 1".to_string(),
        });
    }
    if breaker.reset_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "circuit_breaker.reset_timeout_secs",
            message: "must be at least 1".to_string(),
        });
    }
    if breaker.call_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "circuit_breaker.call_timeout_secs",
            message: "must be at least 1".to_string(),
        });
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.requests_per_window == 0 {
        errors.push(ValidationError {
            field: "rate_limit.requests_per_window",
            message: "must be at least 1".to_string(),
        });
    }
    if rate_limit.window_secs == 0 {
        errors.push(ValidationError {
            field: "rate_limit.window_secs",
            message: "must be at least 1".to_string(),
        });
    }
    if rate_limit.burst == 0 {
        errors.push(ValidationError {
            field: "rate_limit.burst",
            message: "must be at least 1".to_string(),
        });
    }

    if config.cors.allowed_origins.is_empty() {
        errors.push(ValidationError {
            field: "cors.allowed_origins",
            message: "must list at least one origin".to_string(),
        });
    }
    for origin in &config.cors.allowed_origins {
        if HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError {
                field: "cors.allowed_origins",
                message: format!("not a valid origin value: {origin}"),
            });
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError {
            field: "observability.log_level",
            message: format!(
                "unknown level {:?}, expected one of {:?}",
                config.observability.log_level, LOG_LEVELS
            ),
        });
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: format!(
                "not a valid socket address: {}",
                config.observability.metrics_address
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_violations() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.circuit_breaker.max_failures = 0;
        config.rate_limit.burst = 0;
        config.cors.allowed_origins.clear();
        config.observability.log_level = "loud".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"circuit_breaker.max_failures"));
        assert!(fields.contains(&"rate_limit.burst"));
        assert!(fields.contains(&"cors.allowed_origins"));
        assert!(fields.contains(&"observability.log_level"));
    }
}
