//! Gateway callback handlers.
//!
//! Each gateway calls back twice: once through the payer's browser (return
//! URL) and once server-to-server (IPN/callback). Both go through the same
//! reconciliation; only the response shape differs per gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::Json;
use serde::Serialize;

use coin_recharge_core::Gateway;

use crate::error::ApiError;
use crate::gateways::{CallbackPayload, Delivery};
use crate::reconciler::RedirectHint;
use crate::state::AppState;

// ============================================================================
// Browser returns
// ============================================================================

/// VNPay browser return.
pub async fn vnpay_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Redirect, ApiError> {
    browser_return(&state, Gateway::VnPay, params)
}

/// MoMo browser return.
pub async fn momo_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Redirect, ApiError> {
    browser_return(&state, Gateway::MoMo, params)
}

/// ZaloPay browser return.
pub async fn zalopay_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Redirect, ApiError> {
    browser_return(&state, Gateway::ZaloPay, params)
}

fn browser_return(
    state: &AppState,
    gateway: Gateway,
    params: BTreeMap<String, String>,
) -> Result<Redirect, ApiError> {
    let payload = CallbackPayload::new(Delivery::Redirect, params);
    let hint = state.reconciler.reconcile(gateway, &payload)?;

    Ok(Redirect::to(&hint.redirect_url(&state.config.frontend_url)))
}

// ============================================================================
// Server-to-server notifications
// ============================================================================

/// VNPay IPN acknowledgement.
#[derive(Debug, Serialize)]
pub struct VnPayIpnResponse {
    /// VNPay result code.
    #[serde(rename = "RspCode")]
    pub rsp_code: &'static str,
    /// Human-readable message.
    #[serde(rename = "Message")]
    pub message: &'static str,
}

impl VnPayIpnResponse {
    fn from_result(result: &Result<RedirectHint, ApiError>) -> Self {
        let (rsp_code, message) = match result {
            Ok(hint) if hint.duplicate => ("02", "Order already confirmed"),
            Ok(hint) if hint.amount_mismatch => ("04", "Invalid amount"),
            Ok(_) => ("00", "Confirm Success"),
            Err(ApiError::SignatureInvalid) => ("97", "Invalid Checksum"),
            Err(ApiError::NotFound(_)) => ("01", "Order not found"),
            Err(_) => ("99", "Unknown error"),
        };
        Self { rsp_code, message }
    }
}

/// VNPay IPN. VNPay expects HTTP 200 with a result code in every case.
pub async fn vnpay_ipn(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Json<VnPayIpnResponse> {
    let payload = CallbackPayload::new(Delivery::Notification, params);
    let result = state.reconciler.reconcile(Gateway::VnPay, &payload);

    Json(VnPayIpnResponse::from_result(&result))
}

/// MoMo IPN. Acknowledged with 204; errors use the normal error envelope.
pub async fn momo_ipn(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<StatusCode, ApiError> {
    let payload = CallbackPayload::new(Delivery::Notification, flatten(body));
    state.reconciler.reconcile(Gateway::MoMo, &payload)?;

    Ok(StatusCode::NO_CONTENT)
}

/// ZaloPay callback acknowledgement.
#[derive(Debug, Serialize)]
pub struct ZaloPayCallbackResponse {
    /// 1 processed, 2 already processed, -1 bad mac, 0 anything else.
    pub return_code: i32,
    /// Human-readable message.
    pub return_message: String,
}

impl ZaloPayCallbackResponse {
    fn from_result(result: Result<RedirectHint, ApiError>) -> Self {
        let (return_code, return_message) = match result {
            Ok(hint) if hint.duplicate => (2, "order already processed".to_string()),
            Ok(_) => (1, "success".to_string()),
            Err(ApiError::SignatureInvalid) => (-1, "mac not equal".to_string()),
            Err(e) => (0, e.to_string()),
        };
        Self {
            return_code,
            return_message,
        }
    }
}

/// ZaloPay callback.
pub async fn zalopay_callback(
    State(state): State<Arc<AppState>>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> Json<ZaloPayCallbackResponse> {
    let payload = CallbackPayload::new(Delivery::Notification, flatten(body));
    let result = state.reconciler.reconcile(Gateway::ZaloPay, &payload);

    Json(ZaloPayCallbackResponse::from_result(result))
}

/// Turn a JSON object into string fields. Numbers keep their decimal form
/// so they sign the same as the gateway's own string rendering.
fn flatten(body: serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    body.into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}
