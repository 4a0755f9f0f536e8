//! HTTP API for the wallet ledger.
//!
//! # Modules
//!
//! - [`wallets`]: Wallet handlers (create, read, deposit/withdraw)
//! - [`rate_limiter`]: Per-route, per-client sliding window limits
//! - [`request_id`]: `x-request-id` propagation and request logging
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                              - Health check
//! POST /api/v1/wallets                      - Create wallet (201)
//! GET  /api/v1/wallets/{wallet_id}          - Get balance
//! POST /api/v1/wallets/{wallet_id}/operation - Deposit or withdraw
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use wallet_server::api::{AppState, create_router, rate_limiter::RouteLimits};
//! use wallet_ledger::{db::MemoryWalletStore, wallet::WalletManager};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryWalletStore::new(Duration::from_secs(5)));
//! let state = AppState {
//!     wallet_manager: Arc::new(WalletManager::new(store, Duration::from_secs(10))),
//! };
//!
//! let app = create_router(state, &RouteLimits::default());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. Restrict origins in front of the server
//! if the API is exposed to browsers.

pub mod rate_limiter;
pub mod request_id;
pub mod wallets;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{MethodRouter, get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use wallet_ledger::wallet::WalletManager;

use rate_limiter::{KeyedRateLimiter, RouteLimits, enforce_rate_limit};

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub wallet_manager: Arc<WalletManager>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// Each wallet route gets its own rate limiter when `limits.enabled` is set.
pub fn create_router(state: AppState, limits: &RouteLimits) -> Router {
    let v1_routes = create_v1_router(limits);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with the wallet endpoints.
fn create_v1_router(limits: &RouteLimits) -> Router<AppState> {
    Router::new()
        .route(
            "/wallets",
            limited(post(wallets::create_wallet), limits, "create", limits.create_per_minute),
        )
        .route(
            "/wallets/{wallet_id}",
            limited(get(wallets::get_wallet), limits, "read", limits.read_per_minute),
        )
        .route(
            "/wallets/{wallet_id}/operation",
            limited(
                post(wallets::wallet_operation),
                limits,
                "operation",
                limits.operation_per_minute,
            ),
        )
}

/// Wrap a route in its own per-client rate limiter
fn limited(
    route: MethodRouter<AppState>,
    limits: &RouteLimits,
    name: &'static str,
    per_minute: usize,
) -> MethodRouter<AppState> {
    if !limits.enabled {
        return route;
    }
    let limiter = Arc::new(KeyedRateLimiter::per_minute(name, per_minute));
    route.layer(middleware::from_fn_with_state(limiter, enforce_rate_limit))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the wallet store answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8000/health
/// # {"status":"healthy","version":"1.0.0","store":true,"timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state.wallet_manager.health_check().await.is_ok();

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if store_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
