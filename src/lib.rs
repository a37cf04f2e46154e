//! backstop — resilience guards for HTTP services.
//!
//! Two independent, composable components, both in-memory and safe for
//! concurrent use from many request handlers:
//!
//! - [`CircuitBreaker`]: wraps a potentially-failing async operation with a
//!   closed/open/half-open protection machine that stops calling a failing
//!   dependency and probes recovery after a cooldown.
//! - [`KeyedRateLimiter`]: one token bucket per client key, created lazily,
//!   enforcing a steady request rate with burst capacity.
//!
//! Neither depends on the other; handlers call both around outbound work and
//! translate the outcomes into responses. The [`http`] module provides that
//! wiring for an Axum server.

pub mod config;
pub mod http;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::AppConfig;
pub use http::HttpServer;
pub use resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use security::KeyedRateLimiter;
