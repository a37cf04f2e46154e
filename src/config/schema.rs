//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitBreakerConfig;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Circuit breaker settings for the protected dependency.
    pub circuit_breaker: BreakerSettings,

    /// Per-client rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Cross-origin resource sharing settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Cross-origin resource sharing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "https://localhost:8080".to_string(),
            ],
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 15 }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,

    /// Seconds the circuit stays open before admitting a probe.
    pub reset_timeout_secs: u64,

    /// Deadline for each protected call, in seconds.
    pub call_timeout_secs: u64,

    /// Successful probes required to close the circuit again.
    pub max_half_open_probes: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            reset_timeout_secs: 30,
            call_timeout_secs: 10,
            max_half_open_probes: 3,
        }
    }
}

impl BreakerSettings {
    /// Convert to the runtime breaker configuration.
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_failures: self.max_failures,
            reset_timeout: Duration::from_secs(self.reset_timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_half_open_probes: self.max_half_open_probes,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Requests allowed per window, per client.
    pub requests_per_window: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Burst capacity (maximum instantaneous allowance).
    pub burst: u32,

    /// How often idle buckets are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Idle time after which a client's bucket is dropped, in seconds.
    pub max_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 100,
            window_secs: 60,
            burst: 20,
            sweep_interval_secs: 300,
            max_idle_secs: 600,
        }
    }
}

impl RateLimitConfig {
    /// Steady per-client rate derived from the window configuration.
    pub fn rate_per_second(&self) -> f64 {
        self.requests_per_window as f64 / self.window_secs as f64
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_service_settings() {
        let config = AppConfig::default();
        assert_eq!(config.circuit_breaker.max_failures, 5);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 30);
        assert_eq!(config.rate_limit.burst, 20);
        assert!((config.rate_limit.rate_per_second() - 100.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn breaker_settings_convert_to_durations() {
        let settings = BreakerSettings {
            max_failures: 3,
            reset_timeout_secs: 7,
            call_timeout_secs: 2,
            max_half_open_probes: 1,
        };
        let config = settings.to_breaker_config();
        assert_eq!(config.reset_timeout, Duration::from_secs(7));
        assert_eq!(config.call_timeout, Duration::from_secs(2));
    }
}
