//! Coin recharge HTTP API service.
//!
//! This crate provides the HTTP API for buying platform coins, including:
//!
//! - Account registration
//! - Recharge orders through VNPay, MoMo and ZaloPay
//! - Gateway callback reconciliation
//! - Coin balance, history, summaries and usage
//! - A background reaper for abandoned orders
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **JWT bearer tokens** - For end-user requests
//! 2. **Service API keys** - For platform services spending coins
//! 3. **Admin API keys** - For grants and ledger audits
//!
//! Gateway callbacks are authenticated by their HMAC signatures instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Callback handlers need async for routing

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateways;
pub mod handlers;
pub mod ledger;
pub mod orchestrator;
pub mod reaper;
pub mod reconciler;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use gateways::{GatewayAdapter, GatewayRegistry};
pub use ledger::Ledger;
pub use orchestrator::Orchestrator;
pub use reaper::TimeoutReaper;
pub use reconciler::Reconciler;
pub use routes::create_router;
pub use state::AppState;
