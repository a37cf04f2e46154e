//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, panic recovery, timeout, request ID,
//!   CORS, security headers, per-client rate limiting)
//! - Translate guard outcomes into responses: open circuit → 503,
//!   deadline overrun → 504, upstream error → 502, rate limited → 429,
//!   handler panic → 500
//! - Expose breaker statistics on the health endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::resilience::{BreakerError, CircuitBreaker, CircuitState};
use crate::security::headers::security_headers_middleware;
use crate::security::rate_limit::{rate_limit_middleware, KeyedRateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub breaker: Arc<CircuitBreaker>,
    pub limiter: Arc<KeyedRateLimiter>,
}

/// HTTP server wiring the guards around a protected upstream operation.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<KeyedRateLimiter>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.to_breaker_config()));
        let limiter = Arc::new(KeyedRateLimiter::new(
            config.rate_limit.rate_per_second(),
            config.rate_limit.burst,
        ));

        let state = AppState {
            breaker: breaker.clone(),
            limiter: limiter.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            breaker,
            limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let limiter = state.limiter.clone();

        let mut router = Router::new()
            .route("/", get(index_handler))
            .route("/work", get(work_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        if config.rate_limit.enabled {
            router = router.layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));
        }

        router
            .layer(axum::middleware::from_fn(security_headers_middleware))
            .layer(cors_layer(&config.cors.allowed_origins))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // Periodically drop idle rate limit buckets so a churning key space
        // cannot grow the map without bound.
        if self.config.rate_limit.enabled && self.config.rate_limit.sweep_interval_secs > 0 {
            let limiter = self.limiter.clone();
            let sweep_interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            let max_idle = Duration::from_secs(self.config.rate_limit.max_idle_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let removed = limiter.sweep_idle(max_idle);
                    if removed > 0 {
                        tracing::debug!(
                            removed,
                            remaining = limiter.tracked_keys(),
                            "Swept idle rate limit buckets"
                        );
                    }
                }
            });
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Handle to the breaker protecting the upstream operation.
    pub fn breaker(&self) -> Arc<CircuitBreaker> {
        self.breaker.clone()
    }

    /// Handle to the per-client rate limiter.
    pub fn limiter(&self) -> Arc<KeyedRateLimiter> {
        self.limiter.clone()
    }
}

/// CORS policy mirroring the service's browser clients: explicit origin
/// list, credentialed requests, one-day preflight cache.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86_400))
}

#[derive(Debug, Error)]
enum UpstreamError {
    #[error("upstream reported failure")]
    Forced,
}

/// Parameters for the guarded demo operation: force a failure, a panic, or
/// injected latency to exercise the breaker's deadline path.
#[derive(Debug, Deserialize)]
struct WorkParams {
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    panic: bool,
    delay_ms: Option<u64>,
}

async fn index_handler() -> &'static str {
    "backstop: circuit breaker + keyed rate limiter\n"
}

/// Run the protected upstream operation and translate the outcome.
async fn work_handler(State(state): State<AppState>, Query(params): Query<WorkParams>) -> Response {
    let fail = params.fail;
    let trip_panic = params.panic;
    let delay = Duration::from_millis(params.delay_ms.unwrap_or(0));

    let result = state
        .breaker
        .call(|| async move {
            if trip_panic {
                panic!("simulated handler panic");
            }
            if fail {
                return Err(UpstreamError::Forced);
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok("work complete\n")
        })
        .await;

    match result {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(BreakerError::Open) => {
            tracing::warn!("Request rejected, circuit is open");
            (StatusCode::SERVICE_UNAVAILABLE, "Service temporarily unavailable\n").into_response()
        }
        Err(BreakerError::Timeout) => {
            (StatusCode::GATEWAY_TIMEOUT, "Upstream call timed out\n").into_response()
        }
        Err(BreakerError::Inner(e)) => {
            tracing::error!(error = %e, "Upstream call failed");
            (StatusCode::BAD_GATEWAY, "Upstream call failed\n").into_response()
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}

/// Service health plus read-only guard statistics.
async fn health_handler(State(state): State<AppState>) -> Response {
    let stats = state.breaker.stats();
    let status = match stats.state {
        CircuitState::Open => "degraded",
        _ => "ok",
    };

    Json(serde_json::json!({
        "status": status,
        "circuit_breaker": stats,
        "rate_limiter": {
            "tracked_keys": state.limiter.tracked_keys(),
        },
    }))
    .into_response()
}
