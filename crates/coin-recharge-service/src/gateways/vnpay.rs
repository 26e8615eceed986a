//! VNPay adapter.
//!
//! VNPay needs no server-side call to start a payment: the payment URL is the
//! configured pay page plus the signed parameters. The signature is
//! HMAC-SHA512 over the parameters sorted by key, each key and value
//! form-urlencoded and joined with `&`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Duration;

use coin_recharge_core::{vietnam_offset, Gateway, RechargeOrder};

use super::{
    parse_amount, CallbackOutcome, CallbackPayload, CallbackResult, ClientContext, GatewayAdapter,
    GatewayError, RedirectTarget,
};
use crate::config::VnPayConfig;
use crate::crypto::{digest_matches, hmac_sha512_hex};

const VERSION: &str = "2.1.0";
const HASH_FIELD: &str = "vnp_SecureHash";
const HASH_TYPE_FIELD: &str = "vnp_SecureHashType";
const SUCCESS_CODE: &str = "00";

/// How long the VNPay payment page stays valid.
const PAYMENT_WINDOW_MINUTES: i64 = 15;

/// VNPay adapter.
#[derive(Debug, Clone)]
pub struct VnPayAdapter {
    config: VnPayConfig,
    return_url: String,
}

impl VnPayAdapter {
    /// Create a VNPay adapter.
    #[must_use]
    pub fn new(config: VnPayConfig, return_url: String) -> Self {
        Self { config, return_url }
    }

    /// Sign a parameter set with the merchant secret.
    #[must_use]
    pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
        hmac_sha512_hex(&self.config.hash_secret, &canonical_query(params))
    }

    fn order_params(
        &self,
        order: &RechargeOrder,
        ctx: &ClientContext,
    ) -> Result<BTreeMap<String, String>, GatewayError> {
        let amount = order
            .fiat_amount
            .checked_mul(100)
            .ok_or_else(|| GatewayError::Configuration("amount overflows vnp_Amount".into()))?;
        let created = order.created_at.with_timezone(&vietnam_offset());
        let expires = created + Duration::minutes(PAYMENT_WINDOW_MINUTES);
        let locale = match ctx.locale.as_deref() {
            Some("en") => "en",
            _ => "vn",
        };
        let ip_addr = if ctx.ip_addr.is_empty() {
            "127.0.0.1"
        } else {
            ctx.ip_addr.as_str()
        };

        let params = [
            ("vnp_Version", VERSION.to_string()),
            ("vnp_Command", "pay".to_string()),
            ("vnp_TmnCode", self.config.tmn_code.clone()),
            ("vnp_Amount", amount.to_string()),
            ("vnp_CurrCode", "VND".to_string()),
            ("vnp_TxnRef", order.order_code.clone()),
            (
                "vnp_OrderInfo",
                format!("Recharge {} coins {}", order.credit_amount, order.order_code),
            ),
            ("vnp_OrderType", "other".to_string()),
            ("vnp_Locale", locale.to_string()),
            ("vnp_ReturnUrl", self.return_url.clone()),
            ("vnp_IpAddr", ip_addr.to_string()),
            ("vnp_CreateDate", created.format("%Y%m%d%H%M%S").to_string()),
            ("vnp_ExpireDate", expires.format("%Y%m%d%H%M%S").to_string()),
        ];

        Ok(params
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }
}

#[async_trait]
impl GatewayAdapter for VnPayAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::VnPay
    }

    async fn build_order_request(
        &self,
        order: &RechargeOrder,
        ctx: &ClientContext,
    ) -> Result<RedirectTarget, GatewayError> {
        let params = self.order_params(order, ctx)?;
        let query = canonical_query(&params);
        let hash = hmac_sha512_hex(&self.config.hash_secret, &query);
        let url = format!("{}?{query}&{HASH_FIELD}={hash}", self.config.pay_url);

        Ok(RedirectTarget {
            url,
            raw: serde_json::json!({ "params": params }),
        })
    }

    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError> {
        let received = payload.require(HASH_FIELD)?;

        let signed: BTreeMap<String, String> = payload
            .params
            .iter()
            .filter(|(k, _)| k.starts_with("vnp_") && *k != HASH_FIELD && *k != HASH_TYPE_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if !digest_matches(&self.sign(&signed), received) {
            return Err(GatewayError::SignatureInvalid);
        }

        let order_code = payload.require("vnp_TxnRef")?.to_string();
        let amount = parse_amount("vnp_Amount", payload.require("vnp_Amount")?)?;

        let response_ok = payload.require("vnp_ResponseCode")? == SUCCESS_CODE;
        let status_ok = payload
            .params
            .get("vnp_TransactionStatus")
            .map_or(true, |s| s == SUCCESS_CODE);

        Ok(CallbackResult {
            order_code,
            outcome: if response_ok && status_ok {
                CallbackOutcome::Success
            } else {
                CallbackOutcome::Failed
            },
            verified_amount: amount / 100,
            gateway_reference: payload
                .params
                .get("vnp_TransactionNo")
                .filter(|s| !s.is_empty())
                .cloned(),
        })
    }
}

/// The string VNPay signs: sorted `key=value` pairs, form-urlencoded.
#[must_use]
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", form_encode(k), form_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
