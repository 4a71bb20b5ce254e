//! # neuroproof HTTP API
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status/{dataset}` - Store version and the dataset's summary counters
//! - `GET /segments/{dataset}/{body_id}` - A live segment
//! - `GET /history/{dataset}/{body_id}` - Merge provenance of a segment
//! - `POST /merge/{dataset}` - Apply a merge instruction
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `NEUROPROOF_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `NEUROPROOF_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `NEUROPROOF_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, ApiKey};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
#[allow(unused_imports)]
pub use handlers::{
    health_handler, history_handler, merge_handler, segment_handler, status_handler,
};
#[allow(unused_imports)]
pub use types::{
    ErrorResponse, HealthResponse, HistoryResponse, MergeResponse, SegmentResponse,
    StatusResponse, SummaryJson, status_for,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use neuroproof_core::{NeuroError, Store};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Merge instructions can list millions of synapses.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// CORS from `NEUROPROOF_CORS_ORIGINS`: "*" allows everything, a list
/// allows those origins, unset means localhost only.
fn build_cors_layer() -> CorsLayer {
    match std::env::var("NEUROPROOF_CORS_ORIGINS").ok().as_deref() {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins (NEUROPROOF_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!("CORS: invalid origin '{}': {}", origin, e);
                        None
                    }
                })
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: no valid origins configured, defaulting to localhost");
                cors_for(localhost_origins())
            } else {
                cors_for(allowed)
            }
        }
        None => cors_for(localhost_origins()),
    }
}

fn localhost_origins() -> Vec<HeaderValue> {
    [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse().ok())
    .collect()
}

fn cors_for(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting, authentication.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status/{dataset}", get(handlers::status_handler))
        .route("/segments/{dataset}/{body_id}", get(handlers::segment_handler))
        .route("/history/{dataset}/{body_id}", get(handlers::history_handler))
        .route("/merge/{dataset}", post(handlers::merge_handler));

    match ApiKey::from_env() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                key,
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED; set {} to require a bearer key",
            API_KEY_ENV
        ),
    }

    let rate_limit = get_rate_limit_from_env();
    match create_rate_limiter(rate_limit) {
        Some(limiter) => {
            tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("Rate limiting disabled"),
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `store` on `addr` until Ctrl+C.
pub async fn run_server(addr: &str, store: Store) -> Result<(), NeuroError> {
    let router = create_router(AppState::new(store));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NeuroError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("neuroproof HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
        })
        .await
        .map_err(|e| NeuroError::IoError(format!("Server error: {}", e)))
}
