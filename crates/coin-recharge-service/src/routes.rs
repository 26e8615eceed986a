//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, callbacks, credits, health, orders};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for usage endpoints.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (JWT auth)
/// - `POST /v1/accounts` - Register account
/// - `GET /v1/accounts/me` - Get current user's account
///
/// ## Recharge (JWT auth)
/// - `POST /v1/recharge/orders` - Create order, returns gateway URL
/// - `GET /v1/recharge/orders` - List own orders
/// - `GET /v1/recharge/orders/:order_code` - Get own order
///
/// ## Credits (JWT auth)
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/transactions` - Filtered history
/// - `GET /v1/credits/summary` - Totals by category
///
/// ## Usage (Service API key auth, rate-limited)
/// - `POST /v1/credits/usage` - Spend coins for a user
///
/// ## Admin (Admin key auth)
/// - `POST /v1/admin/credits` - Grant bonus or refund coins
/// - `GET /v1/admin/ledger/:user_id/verify` - Replay a ledger
///
/// ## Gateway callbacks (signature verification, no rate limit)
/// - `GET /callbacks/{vnpay,momo,zalopay}/return` - Browser returns
/// - `GET /callbacks/vnpay/ipn` - VNPay IPN
/// - `POST /callbacks/momo/ipn` - MoMo IPN
/// - `POST /callbacks/zalopay/callback` - ZaloPay callback
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let usage_routes = Router::new()
        .route("/credits/usage", post(credits::record_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Recharge
        .route(
            "/recharge/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route("/recharge/orders/:order_code", get(orders::get_order))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/transactions", get(credits::list_transactions))
        .route("/credits/summary", get(credits::get_summary))
        // Admin
        .route("/admin/credits", post(admin::grant_credits))
        .route("/admin/ledger/:user_id/verify", get(admin::verify_ledger))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Usage routes (with their own concurrency limit)
        .merge(usage_routes);

    let callback_routes = Router::new()
        .route("/vnpay/return", get(callbacks::vnpay_return))
        .route("/vnpay/ipn", get(callbacks::vnpay_ipn))
        .route("/momo/return", get(callbacks::momo_return))
        .route("/momo/ipn", post(callbacks::momo_ipn))
        .route("/zalopay/return", get(callbacks::zalopay_return))
        .route("/zalopay/callback", post(callbacks::zalopay_callback));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Gateway callbacks (no rate limit - controlled by the gateways)
        .nest("/callbacks", callback_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
