//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → trace + request ID layers (correlation)
//!     → rate limit middleware (429 when the client's bucket is empty)
//!     → handler calls the circuit breaker around the upstream operation
//!     → outcome translated: open → 503, timeout → 504, error → 502
//! ```

pub mod server;

pub use server::HttpServer;
