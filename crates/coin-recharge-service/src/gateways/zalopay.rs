//! ZaloPay adapter.
//!
//! ZaloPay uses two keys: `key1` signs outbound order requests, `key2` signs
//! everything ZaloPay sends back. The server callback carries a JSON string in
//! `data` with `mac = HMAC(key2, data)` and is only sent for successful
//! payments. The browser redirect carries a `checksum` over a pipe-joined
//! field list and reports the outcome in `status`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use coin_recharge_core::{Gateway, RechargeOrder};

use super::{
    parse_amount, CallbackOutcome, CallbackPayload, CallbackResult, ClientContext, Delivery,
    GatewayAdapter, GatewayError, RedirectTarget,
};
use crate::config::ZaloPayConfig;
use crate::crypto::{digest_matches, hmac_sha256_hex};

const CREATE_PATH: &str = "/v2/create";

/// Redirect fields covered by the checksum, in signing order.
const REDIRECT_FIELDS: [&str; 7] = [
    "appid",
    "apptransid",
    "pmcid",
    "bankcode",
    "amount",
    "discountamount",
    "status",
];

/// Create-order response body.
#[derive(Debug, Deserialize, Serialize)]
struct CreateOrderResponse {
    return_code: i64,
    #[serde(default)]
    return_message: String,
    #[serde(default)]
    sub_return_message: Option<String>,
    #[serde(default)]
    order_url: Option<String>,
    #[serde(default)]
    zp_trans_token: Option<String>,
}

/// The JSON document inside a server callback's `data` field.
#[derive(Debug, Deserialize)]
struct CallbackData {
    app_trans_id: String,
    amount: i64,
    #[serde(default)]
    zp_trans_id: Option<serde_json::Value>,
}

/// ZaloPay adapter.
#[derive(Debug, Clone)]
pub struct ZaloPayAdapter {
    client: Client,
    config: ZaloPayConfig,
    redirect_url: String,
    callback_url: String,
}

impl ZaloPayAdapter {
    /// Create a ZaloPay adapter.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: ZaloPayConfig,
        redirect_url: String,
        callback_url: String,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            config,
            redirect_url,
            callback_url,
        })
    }

    /// Signature ZaloPay puts on a server callback's `data`.
    #[must_use]
    pub fn callback_mac(&self, data: &str) -> String {
        hmac_sha256_hex(&self.config.key2, data)
    }

    /// Checksum ZaloPay puts on a browser redirect carrying these fields.
    #[must_use]
    pub fn redirect_checksum(&self, payload: &CallbackPayload) -> String {
        let raw = REDIRECT_FIELDS
            .iter()
            .map(|field| payload.field(field))
            .collect::<Vec<_>>()
            .join("|");
        hmac_sha256_hex(&self.config.key2, &raw)
    }

    fn verify_notification(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError> {
        let data = payload.require("data")?;
        let received = payload.require("mac")?;
        if !digest_matches(&self.callback_mac(data), received) {
            return Err(GatewayError::SignatureInvalid);
        }

        let decoded: CallbackData = serde_json::from_str(data)
            .map_err(|e| GatewayError::MalformedCallback(format!("data: {e}")))?;

        Ok(CallbackResult {
            order_code: decoded.app_trans_id,
            outcome: CallbackOutcome::Success,
            verified_amount: decoded.amount,
            gateway_reference: decoded.zp_trans_id.map(|id| match id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
        })
    }

    fn verify_redirect(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError> {
        let received = payload.require("checksum")?;
        if !digest_matches(&self.redirect_checksum(payload), received) {
            return Err(GatewayError::SignatureInvalid);
        }

        Ok(CallbackResult {
            order_code: payload.require("apptransid")?.to_string(),
            outcome: if payload.require("status")? == "1" {
                CallbackOutcome::Success
            } else {
                CallbackOutcome::Failed
            },
            verified_amount: parse_amount("amount", payload.require("amount")?)?,
            gateway_reference: None,
        })
    }
}

#[async_trait]
impl GatewayAdapter for ZaloPayAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::ZaloPay
    }

    async fn build_order_request(
        &self,
        order: &RechargeOrder,
        _ctx: &ClientContext,
    ) -> Result<RedirectTarget, GatewayError> {
        let app_user = order.user_id.to_string();
        let app_time = order.created_at.timestamp_millis().to_string();
        let amount = order.fiat_amount.to_string();
        let embed_data = serde_json::json!({ "redirecturl": self.redirect_url }).to_string();
        let item = "[]";

        let mac = hmac_sha256_hex(
            &self.config.key1,
            &[
                self.config.app_id.as_str(),
                order.order_code.as_str(),
                app_user.as_str(),
                amount.as_str(),
                app_time.as_str(),
                embed_data.as_str(),
                item,
            ]
            .join("|"),
        );

        let description = format!(
            "Recharge {} coins - order {}",
            order.credit_amount, order.order_code
        );
        let form = [
            ("app_id", self.config.app_id.as_str()),
            ("app_user", app_user.as_str()),
            ("app_trans_id", order.order_code.as_str()),
            ("app_time", app_time.as_str()),
            ("amount", amount.as_str()),
            ("item", item),
            ("embed_data", embed_data.as_str()),
            ("description", description.as_str()),
            ("bank_code", ""),
            ("callback_url", self.callback_url.as_str()),
            ("mac", mac.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}{CREATE_PATH}", self.config.endpoint))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "ZaloPay returned HTTP {}",
                response.status()
            )));
        }

        let created: CreateOrderResponse = response.json().await?;
        if created.return_code != 1 {
            return Err(GatewayError::Unavailable(format!(
                "ZaloPay return_code {}: {}",
                created.return_code,
                created
                    .sub_return_message
                    .as_deref()
                    .unwrap_or(&created.return_message)
            )));
        }

        let url = created
            .order_url
            .clone()
            .ok_or_else(|| GatewayError::Unavailable("ZaloPay response has no order_url".into()))?;

        Ok(RedirectTarget {
            url,
            raw: serde_json::json!({
                "app_trans_id": order.order_code,
                "app_time": app_time,
                "response": created,
            }),
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError> {
        match payload.delivery {
            Delivery::Notification => self.verify_notification(payload),
            Delivery::Redirect => self.verify_redirect(payload),
        }
    }
}
