//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to protected dependency:
//!     → circuit_breaker.rs admission (fail fast while the circuit is open)
//!     → bounded by call_timeout (every protected call has a deadline)
//!     → outcome recorded (drives the closed/open/half-open machine)
//! ```
//!
//! # Design Decisions
//! - One breaker instance per protected dependency, shared by all callers
//! - The breaker never retries; it only decides admission and tracks outcomes
//! - Deadline overruns are a distinct error kind so operators can separate
//!   latency-induced failures from application errors

pub mod circuit_breaker;

pub use circuit_breaker::{
    BreakerError, BreakerStats, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
