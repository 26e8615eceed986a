//! Recharge order types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{OrderId, UserId};

/// One attempt to turn fiat money into coins through a payment gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RechargeOrder {
    /// Internal order ID.
    pub id: OrderId,

    /// The user buying coins.
    pub user_id: UserId,

    /// Coins to credit on success.
    pub credit_amount: i64,

    /// Amount charged, in the currency's minor unit.
    pub fiat_amount: i64,

    /// Gateway handling the payment.
    pub gateway: Gateway,

    /// Correlation key presented to the gateway. Unique and immutable.
    pub order_code: String,

    /// Lifecycle state.
    pub status: OrderStatus,

    /// Raw request/response/callback data, kept for audit only.
    pub gateway_metadata: serde_json::Value,

    /// Why the order failed, if it did.
    pub failure_reason: Option<String>,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

impl RechargeOrder {
    /// Create a new pending order.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        credit_amount: i64,
        fiat_amount: i64,
        gateway: Gateway,
        order_code: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::generate(),
            user_id,
            credit_amount,
            fiat_amount,
            gateway,
            order_code,
            status: OrderStatus::Pending,
            gateway_metadata: serde_json::Value::Null,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the order has reached a final state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Store `value` under `key` in the audit metadata object.
    pub fn attach_metadata(&mut self, key: &str, value: serde_json::Value) {
        if !self.gateway_metadata.is_object() {
            self.gateway_metadata = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.gateway_metadata.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self.updated_at = Utc::now();
    }

    /// Move a pending order into a terminal state.
    ///
    /// Storage backends call this inside their write critical section; it is
    /// the single place the `Pending -> terminal` rule lives.
    ///
    /// # Errors
    ///
    /// Returns the current status if the order is not `Pending`.
    pub fn apply_transition(&mut self, transition: &Transition) -> Result<(), OrderStatus> {
        if self.status != OrderStatus::Pending {
            return Err(self.status);
        }

        self.status = transition.to;
        if transition.to == OrderStatus::Failed {
            self.failure_reason.clone_from(&transition.reason);
        }
        if !transition.metadata.is_null() {
            self.attach_metadata("resolution", transition.metadata.clone());
        }
        self.updated_at = Utc::now();

        Ok(())
    }
}

/// A requested `Pending -> terminal` change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Target state. Must be terminal.
    pub to: OrderStatus,
    /// Failure reason, recorded when `to` is `Failed`.
    pub reason: Option<String>,
    /// Data that caused the transition (callback params, sweep info).
    pub metadata: serde_json::Value,
}

impl Transition {
    /// Transition to `Success`.
    #[must_use]
    pub fn success(metadata: serde_json::Value) -> Self {
        Self {
            to: OrderStatus::Success,
            reason: None,
            metadata,
        }
    }

    /// Transition to `Failed` with a reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            to: OrderStatus::Failed,
            reason: Some(reason.into()),
            metadata,
        }
    }
}

/// Order lifecycle: `Pending -> {Success, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for the gateway.
    Pending,

    /// Paid and credited. Final.
    Success,

    /// Declined, abandoned, or failed to start. Final.
    Failed,
}

impl OrderStatus {
    /// `Success` and `Failed` never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Supported payment gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gateway {
    /// VNPay (HMAC-SHA512, browser redirect URL built locally).
    #[serde(rename = "vnpay")]
    VnPay,

    /// MoMo e-wallet (HMAC-SHA256, payment link from API).
    #[serde(rename = "momo")]
    MoMo,

    /// ZaloPay (HMAC-SHA256 with separate request and callback keys).
    #[serde(rename = "zalopay")]
    ZaloPay,
}

impl Gateway {
    /// All gateways, in a stable order.
    pub const ALL: [Self; 3] = [Self::VnPay, Self::MoMo, Self::ZaloPay];

    /// Wire/path identifier.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VnPay => "vnpay",
            Self::MoMo => "momo",
            Self::ZaloPay => "zalopay",
        }
    }

    /// Name shown in ledger descriptions.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::VnPay => "VNPay",
            Self::MoMo => "MoMo",
            Self::ZaloPay => "ZaloPay",
        }
    }

    /// Build an order code in this gateway's namespace.
    ///
    /// Codes are `{prefix}{yyMMddHHmmss}{nonce:06}` in Vietnam time. ZaloPay
    /// requires its transaction ids to start with `yyMMdd_`, so its codes use
    /// that shape instead.
    #[must_use]
    pub fn order_code(&self, now: DateTime<Utc>, nonce: u32) -> String {
        let local = now.with_timezone(&vietnam_offset());
        let nonce = nonce % 1_000_000;
        match self {
            Self::VnPay => format!("VNP{}{nonce:06}", local.format("%y%m%d%H%M%S")),
            Self::MoMo => format!("MOMO{}{nonce:06}", local.format("%y%m%d%H%M%S")),
            Self::ZaloPay => format!(
                "{}_{}{nonce:06}",
                local.format("%y%m%d"),
                local.format("%H%M%S")
            ),
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vnpay" => Ok(Self::VnPay),
            "momo" => Ok(Self::MoMo),
            "zalopay" => Ok(Self::ZaloPay),
            other => Err(ValidationError::UnsupportedGateway(other.to_string())),
        }
    }
}

/// GMT+7, the timezone all three gateways expect timestamps in.
///
/// # Panics
///
/// Never in practice: seven hours is inside chrono's valid offset range.
#[must_use]
pub fn vietnam_offset() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).expect("GMT+7 is a valid offset")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn pending_order_is_not_terminal() {
        let order = RechargeOrder::pending(
            UserId::generate(),
            500,
            50_000,
            Gateway::MoMo,
            "MOMO240101000000000001".into(),
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_terminal());
        assert!(OrderStatus::Success.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn transition_applies_once() {
        let mut order =
            RechargeOrder::pending(UserId::generate(), 10, 1000, Gateway::VnPay, "VNP1".into());

        order
            .apply_transition(&Transition::failed("declined", serde_json::json!({"code": "24"})))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("declined"));
        assert_eq!(order.gateway_metadata["resolution"]["code"], "24");

        let again = order.apply_transition(&Transition::success(serde_json::Value::Null));
        assert_eq!(again, Err(OrderStatus::Failed));
        assert_eq!(order.status, OrderStatus::Failed);
    }

    #[test]
    fn attach_metadata_keeps_existing_keys() {
        let mut order =
            RechargeOrder::pending(UserId::generate(), 10, 1000, Gateway::MoMo, "MOMO1".into());
        order.attach_metadata("request", serde_json::json!({"a": 1}));
        order.attach_metadata("response", serde_json::json!({"b": 2}));

        assert_eq!(order.gateway_metadata["request"]["a"], 1);
        assert_eq!(order.gateway_metadata["response"]["b"], 2);
    }

    #[test]
    fn gateway_parses_case_insensitively() {
        assert_eq!("VNPay".parse::<Gateway>().unwrap(), Gateway::VnPay);
        assert_eq!("momo".parse::<Gateway>().unwrap(), Gateway::MoMo);
        assert_eq!("ZALOPAY".parse::<Gateway>().unwrap(), Gateway::ZaloPay);
        assert!(matches!(
            "paypal".parse::<Gateway>(),
            Err(ValidationError::UnsupportedGateway(_))
        ));
    }

    #[test]
    fn gateway_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Gateway::VnPay).unwrap(), "\"vnpay\"");
        let parsed: Gateway = serde_json::from_str("\"zalopay\"").unwrap();
        assert_eq!(parsed, Gateway::ZaloPay);
    }

    #[test]
    fn order_codes_follow_gateway_namespace() {
        // 2024-03-05 17:04:09 UTC is 2024-03-06 00:04:09 in GMT+7.
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 17, 4, 9).unwrap();

        assert_eq!(Gateway::VnPay.order_code(now, 42), "VNP240306000409000042");
        assert_eq!(Gateway::MoMo.order_code(now, 7), "MOMO240306000409000007");
        assert_eq!(Gateway::ZaloPay.order_code(now, 1_234_567), "240306_000409234567");
    }
}
