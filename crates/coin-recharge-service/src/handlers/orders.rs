//! Recharge order handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use coin_recharge_core::{Gateway, OrderStatus, RechargeOrder};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::gateways::ClientContext;
use crate::orchestrator::CreatedOrder;
use crate::state::AppState;

/// Create order request.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Coins to buy.
    pub credit_amount: i64,
    /// `vnpay`, `momo` or `zalopay`.
    pub gateway: String,
}

/// Start a recharge: returns the gateway page to send the browser to.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<CreatedOrder>, ApiError> {
    let gateway: Gateway = body.gateway.parse()?;
    let ctx = client_context(&headers);

    let created = state
        .orchestrator
        .create_order(auth.user_id, body.credit_amount, gateway, &ctx)
        .await?;

    Ok(Json(created))
}

/// Order response.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// Gateway-facing order code.
    pub order_code: String,
    /// Gateway.
    pub gateway: Gateway,
    /// Coins credited on success.
    pub credit_amount: i64,
    /// Amount charged.
    pub fiat_amount: i64,
    /// Current status.
    pub status: OrderStatus,
    /// Why the order failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Created timestamp.
    pub created_at: String,
    /// Updated timestamp.
    pub updated_at: String,
}

impl From<&RechargeOrder> for OrderResponse {
    fn from(order: &RechargeOrder) -> Self {
        Self {
            order_code: order.order_code.clone(),
            gateway: order.gateway,
            credit_amount: order.credit_amount,
            fiat_amount: order.fiat_amount,
            status: order.status,
            failure_reason: order.failure_reason.clone(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

/// Get one of the caller's orders.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_code): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    // Another user's order reads as missing.
    let order = state
        .store
        .get_order_by_code(&order_code)?
        .filter(|o| o.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound(format!("order not found: {order_code}")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// Order list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    /// Maximum number of orders to return (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// List orders response.
#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    /// Orders (newest first).
    pub orders: Vec<OrderResponse>,
    /// Whether there are more orders.
    pub has_more: bool,
}

/// List the caller's orders, newest first.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.clamp(1, 100);
    let orders = state
        .store
        .list_orders_by_user(&auth.user_id, limit + 1, query.offset)?;

    let has_more = orders.len() > limit;
    let orders = orders.iter().take(limit).map(OrderResponse::from).collect();

    Ok(Json(ListOrdersResponse { orders, has_more }))
}

/// Payer IP and language from the request headers.
fn client_context(headers: &HeaderMap) -> ClientContext {
    let ip_addr = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .unwrap_or_default();
    let locale = headers
        .get("accept-language")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            if v.trim_start().starts_with("en") {
                "en".to_string()
            } else {
                "vn".to_string()
            }
        });

    ClientContext { ip_addr, locale }
}
