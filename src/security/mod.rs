//! Security subsystem.
//!
//! # Responsibilities
//! - Per-client rate limiting (token buckets keyed by client address)
//! - Baseline security headers on every response
//!
//! # Design Decisions
//! - Rate limiting is keyed, not global: one abusive client must not starve
//!   the rest
//! - Rejections are cheap (no allocation beyond the key) and observable
//!   (structured log + metric per rejection)

pub mod headers;
pub mod rate_limit;

pub use rate_limit::KeyedRateLimiter;
