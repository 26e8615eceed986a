//! Payment gateway adapters.
//!
//! Each adapter knows one provider's wire protocol: how to sign the outbound
//! order request and how to verify and decode the inbound callbacks. The rest
//! of the service only sees [`GatewayAdapter`] and picks an implementation
//! through [`GatewayRegistry`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use coin_recharge_core::{Gateway, RechargeOrder};

use crate::config::ServiceConfig;

pub mod momo;
pub mod vnpay;
pub mod zalopay;

pub use momo::MoMoAdapter;
pub use vnpay::VnPayAdapter;
pub use zalopay::ZaloPayAdapter;

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The gateway refused or failed to create the payment.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Callback signature did not match.
    #[error("invalid callback signature")]
    SignatureInvalid,

    /// Callback was missing fields or carried unparseable values.
    #[error("malformed callback: {0}")]
    MalformedCallback(String),

    /// Adapter is misconfigured.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Browser details forwarded to gateways that want them.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    /// Payer IP address.
    pub ip_addr: String,
    /// Preferred language (`vn` or `en`), if the client sent one.
    pub locale: Option<String>,
}

/// Where to send the payer, plus the raw exchange for audit.
#[derive(Debug, Clone)]
pub struct RedirectTarget {
    /// Payment page URL.
    pub url: String,
    /// Request and response as sent/received.
    pub raw: serde_json::Value,
}

/// How a callback reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Browser returning from the payment page.
    Redirect,
    /// Server-to-server notification (IPN).
    Notification,
}

/// An inbound callback, flattened to string parameters.
#[derive(Debug, Clone)]
pub struct CallbackPayload {
    /// Redirect or notification.
    pub delivery: Delivery,
    /// Query or body fields.
    pub params: BTreeMap<String, String>,
}

impl CallbackPayload {
    /// Create a payload from any iterator of string pairs.
    pub fn new<K, V>(delivery: Delivery, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            delivery,
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// A parameter, or `MalformedCallback` naming it.
    pub(crate) fn require(&self, key: &str) -> Result<&str, GatewayError> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| GatewayError::MalformedCallback(format!("missing {key}")))
    }

    /// A parameter, or the empty string.
    pub(crate) fn field(&self, key: &str) -> &str {
        self.params.get(key).map_or("", String::as_str)
    }
}

/// What the gateway reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackOutcome {
    /// Payment captured.
    Success,
    /// Payment declined, cancelled, or errored.
    Failed,
}

/// A callback that passed signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackResult {
    /// Our order code, echoed back by the gateway.
    pub order_code: String,
    /// Reported outcome.
    pub outcome: CallbackOutcome,
    /// Amount the gateway says it charged, in the currency's minor unit.
    pub verified_amount: i64,
    /// The gateway's own transaction id, if it sent one.
    pub gateway_reference: Option<String>,
}

/// One payment provider's protocol.
#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    /// Which gateway this adapter speaks for.
    fn gateway(&self) -> Gateway;

    /// Prepare the payment and return the page to send the payer to.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Unavailable` or `GatewayError::Http` if the
    /// gateway cannot be reached or declines to create the payment.
    async fn build_order_request(
        &self,
        order: &RechargeOrder,
        ctx: &ClientContext,
    ) -> Result<RedirectTarget, GatewayError>;

    /// Verify a callback's signature and decode it. Pure; no I/O.
    ///
    /// # Errors
    ///
    /// - `GatewayError::SignatureInvalid` if the signature does not match.
    /// - `GatewayError::MalformedCallback` if required fields are missing.
    fn verify_callback(&self, payload: &CallbackPayload) -> Result<CallbackResult, GatewayError>;
}

/// Adapters keyed by gateway.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<Gateway, Arc<dyn GatewayAdapter>>,
}

impl GatewayRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the adapter for its gateway.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn GatewayAdapter>) -> Self {
        self.adapters.insert(adapter.gateway(), adapter);
        self
    }

    /// Build every adapter the configuration has secrets for.
    ///
    /// A gateway whose adapter cannot be built is logged and left out.
    #[must_use]
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut registry = Self::new();

        if let Some(vnpay) = &config.vnpay {
            registry = registry.with(Arc::new(VnPayAdapter::new(
                vnpay.clone(),
                config.return_url(Gateway::VnPay.as_str()),
            )));
        }

        if let Some(momo) = &config.momo {
            match MoMoAdapter::new(
                momo.clone(),
                config.return_url(Gateway::MoMo.as_str()),
                config.notify_url(Gateway::MoMo.as_str()),
            ) {
                Ok(adapter) => registry = registry.with(Arc::new(adapter)),
                Err(e) => tracing::error!(error = %e, "Failed to create MoMo adapter"),
            }
        }

        if let Some(zalopay) = &config.zalopay {
            match ZaloPayAdapter::new(
                zalopay.clone(),
                config.return_url(Gateway::ZaloPay.as_str()),
                config.notify_url(Gateway::ZaloPay.as_str()),
            ) {
                Ok(adapter) => registry = registry.with(Arc::new(adapter)),
                Err(e) => tracing::error!(error = %e, "Failed to create ZaloPay adapter"),
            }
        }

        for gateway in Gateway::ALL {
            if !registry.adapters.contains_key(&gateway) {
                tracing::warn!(gateway = %gateway, "Gateway not configured - orders will be rejected");
            }
        }

        registry
    }

    /// The adapter for `gateway`, if configured.
    #[must_use]
    pub fn get(&self, gateway: Gateway) -> Option<Arc<dyn GatewayAdapter>> {
        self.adapters.get(&gateway).cloned()
    }

    /// Configured gateways, in a stable order.
    #[must_use]
    pub fn configured(&self) -> Vec<Gateway> {
        Gateway::ALL
            .into_iter()
            .filter(|g| self.adapters.contains_key(g))
            .collect()
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("configured", &self.configured())
            .finish()
    }
}

/// Parse a decimal amount field.
pub(crate) fn parse_amount(key: &str, value: &str) -> Result<i64, GatewayError> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::MalformedCallback(format!("{key} is not an integer: {value}")))
}
