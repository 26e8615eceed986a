//! MoMo e-wallet adapter.
//!
//! Payments start with a signed JSON POST to `/v2/gateway/api/create`, which
//! answers with a `payUrl`. Signatures are HMAC-SHA256 over a fixed,
//! alphabetical `key=value&...` string that always includes the access key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use coin_recharge_core::{Gateway, RechargeOrder};

use super::{
    parse_amount, CallbackOutcome, CallbackPayload, CallbackResult, ClientContext, GatewayAdapter,
    GatewayError, RedirectTarget,
};
use crate::config::MoMoConfig;
use crate::crypto::{digest_matches, hmac_sha256_hex};

const REQUEST_TYPE: &str = "captureWallet";
const CREATE_PATH: &str = "/v2/gateway/api/create";

/// Fields of a callback covered by the signature, in signing order.
const CALLBACK_FIELDS: [&str; 12] = [
    "amount",
    "extraData",
    "message",
    "orderId",
    "orderInfo",
    "orderType",
    "partnerCode",
    "payType",
    "requestId",
    "responseTime",
    "resultCode",
    "transId",
];

/// Create-payment request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequest<'a> {
    partner_code: &'a str,
    request_id: &'a str,
    amount: i64,
    order_id: &'a str,
    order_info: String,
    redirect_url: &'a str,
    ipn_url: &'a str,
    request_type: &'a str,
    extra_data: &'a str,
    lang: &'a str,
    signature: String,
}

/// Create-payment response body.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentResponse {
    result_code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    pay_url: Option<String>,
}

/// MoMo adapter.
#[derive(Debug, Clone)]
pub struct MoMoAdapter {
    client: Client,
    config: MoMoConfig,
    redirect_url: String,
    ipn_url: String,
}

impl MoMoAdapter {
    /// Create a MoMo adapter.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: MoMoConfig,
        redirect_url: String,
        ipn_url: String,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            config,
            redirect_url,
            ipn_url,
        })
    }

    /// Signature for an outbound create-payment request.
    fn request_signature(&self, order_id: &str, amount: i64, order_info: &str, extra_data: &str) -> String {
        let raw = format!(
            "accessKey={}&amount={amount}&extraData={extra_data}&ipnUrl={}&orderId={order_id}&orderInfo={order_info}&partnerCode={}&redirectUrl={}&requestId={order_id}&requestType={REQUEST_TYPE}",
            self.config.access_key, self.ipn_url, self.config.partner_code, self.redirect_url,
        );
        hmac_sha256_hex(&self.config.secret_key, &raw)
    }

    /// Signature MoMo puts on a redirect or IPN carrying these fields.
    #[must_use]
    pub fn callback_signature(&self, payload: &CallbackPayload) -> String {
        let mut raw = format!("accessKey={}", self.config.access_key);
        for field in CALLBACK_FIELDS {
            raw.push('&');
            raw.push_str(field);
            raw.push('=');
            raw.push_str(payload.field(field));
        }
        hmac_sha256_hex(&self.config.secret_key, &raw)
    }
}

#[async_trait]
impl GatewayAdapter for MoMoAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::MoMo
    }

    async fn build_order_request(
        &self,
        order: &RechargeOrder,
        ctx: &ClientContext,
    ) -> Result<RedirectTarget, GatewayError> {
        let order_info = format!("Recharge {} coins", order.credit_amount);
        let extra_data = "";
        let body = CreatePaymentRequest {
            partner_code: &self.config.partner_code,
            request_id: &order.order_code,
            amount: order.fiat_amount,
            order_id: &order.order_code,
            signature: self.request_signature(
                &order.order_code,
                order.fiat_amount,
                &order_info,
                extra_data,
            ),
            order_info,
            redirect_url: &self.redirect_url,
            ipn_url: &self.ipn_url,
            request_type: REQUEST_TYPE,
            extra_data,
            lang: if ctx.locale.as_deref() == Some("en") { "en" } else { "vi" },
        };

        let response = self
            .client
            .post(format!("{}{CREATE_PATH}", self.config.endpoint))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "MoMo returned HTTP {}",
                response.status()
            )));
        }

        let created: CreatePaymentResponse = response.json().await?;
        if created.result_code != 0 {
            return Err(GatewayError::Unavailable(format!(
                "MoMo resultCode {}: {}",
                created.result_code, created.message
            )));
        }

        let url = created
            .pay_url
            .clone()
            .ok_or_else(|| GatewayError::Unavailable("MoMo response has no payUrl".into()))?;

        Ok(RedirectTarget {
            url,
            raw: serde_json::json!({
                "request_id": order.order_code,
                "response": created,
            }),
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError> {
        let received = payload.require("signature")?;
        if !digest_matches(&self.callback_signature(payload), received) {
            return Err(GatewayError::SignatureInvalid);
        }

        let order_code = payload.require("orderId")?.to_string();
        let amount = parse_amount("amount", payload.require("amount")?)?;
        let result_code = payload.require("resultCode")?;

        Ok(CallbackResult {
            order_code,
            outcome: if result_code == "0" {
                CallbackOutcome::Success
            } else {
                CallbackOutcome::Failed
            },
            verified_amount: amount,
            gateway_reference: payload
                .params
                .get("transId")
                .filter(|s| !s.is_empty())
                .cloned(),
        })
    }
}
