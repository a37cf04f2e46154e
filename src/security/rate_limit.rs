//! Per-client rate limiting middleware.
//!
//! Each key (normally a client IP) gets an independent token bucket with the
//! same `(rate, burst)` configuration, created lazily on first use. One
//! abusive client cannot exhaust capacity for others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::observability::metrics;

/// A simple token bucket with continuous refill.
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    /// Refill from elapsed time, then consume one token if available.
    /// The refill timestamp advances even when the request is denied.
    fn try_acquire(&mut self, burst: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(burst);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A lazily-populated set of per-key token buckets.
///
/// Bucket creation is exactly-once per key even under concurrent first
/// access; the map's shard locks serialize mutation per key without a
/// global lock across unrelated keys.
pub struct KeyedRateLimiter {
    buckets: DashMap<String, TokenBucket>,
    rate_per_sec: f64,
    burst: f64,
}

impl KeyedRateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            rate_per_sec,
            burst: burst as f64,
        }
    }

    /// Decide whether one request for `key` may proceed.
    /// Never errors and never suspends.
    pub fn allow(&self, key: &str) -> bool {
        // Fast path: the bucket already exists.
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(self.burst, self.rate_per_sec);
        }

        self.buckets
            .entry(key.to_owned())
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.rate_per_sec)
    }

    /// Drop buckets that have been idle longer than `max_idle`, returning
    /// how many were removed. A swept key regains a full burst allowance on
    /// its next request.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.last_refill.elapsed() <= max_idle);
        before - self.buckets.len()
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

/// Derive the limiter key for a request: first hop of `X-Forwarded-For`,
/// else `X-Real-IP`, else the socket peer address.
pub fn client_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
    {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    peer.ip().to_string()
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<KeyedRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(request.headers(), addr);

    if limiter.allow(&key) {
        next.run(request).await
    } else {
        tracing::warn!(
            client = %key,
            method = %request.method(),
            path = %request.uri().path(),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited("per_client_rps");
        let mut response = Response::new(Body::from("Rate limit exceeded"));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from_static("60"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_is_consumed_then_denied() {
        let limiter = KeyedRateLimiter::new(1.0, 3);
        for _ in 0..3 {
            assert!(limiter.allow("10.0.0.1"));
        }
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_grants_exactly_one_token() {
        let limiter = KeyedRateLimiter::new(4.0, 2);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // 250ms at 4 tokens/sec refills exactly one token.
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let limiter = KeyedRateLimiter::new(1.0, 2);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_idle_buckets() {
        let limiter = KeyedRateLimiter::new(1.0, 2);
        assert!(limiter.allow("stale"));
        assert!(limiter.allow("fresh"));

        tokio::time::advance(Duration::from_secs(700)).await;
        assert!(limiter.allow("fresh"));

        assert_eq!(limiter.sweep_idle(Duration::from_secs(600)), 1);
        assert_eq!(limiter.tracked_keys(), 1);

        // A swept key starts over with a full burst.
        assert!(limiter.allow("stale"));
        assert!(limiter.allow("stale"));
    }

    #[test]
    fn client_key_prefers_forwarded_headers() {
        let peer: SocketAddr = "192.0.2.9:4711".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        assert_eq!(client_key(&headers, peer), "203.0.113.7");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_key(&headers, peer), "198.51.100.4");

        assert_eq!(client_key(&HeaderMap::new(), peer), "192.0.2.9");
    }
}
