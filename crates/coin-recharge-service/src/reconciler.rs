//! Gateway callback reconciliation.
//!
//! Callbacks can arrive twice (redirect and notification), out of order, or
//! concurrently. The order's conditional `Pending -> terminal` transition
//! picks exactly one winner; the deposit is keyed by the order id so even a
//! repeated posting attempt cannot credit twice.

use std::sync::Arc;

use serde::Serialize;

use coin_recharge_core::{Gateway, OrderStatus, RechargeOrder, Transition, UserRole};
use coin_recharge_store::{Store, StoreError};

use crate::error::ApiError;
use crate::gateways::{CallbackOutcome, CallbackPayload, GatewayError, GatewayRegistry};
use crate::ledger::Ledger;

/// Where to send the browser, and what happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectHint {
    /// Order the callback was about.
    pub order_code: String,
    /// Final order status.
    pub outcome: OrderStatus,
    /// Owner's role, if it could be looked up.
    pub role: Option<UserRole>,
    /// The order was already terminal before this callback.
    pub duplicate: bool,
    /// The gateway reported a different amount than the order.
    pub amount_mismatch: bool,
}

impl RedirectHint {
    /// Frontend result page for this outcome.
    #[must_use]
    pub fn redirect_url(&self, frontend_url: &str) -> String {
        let result = if self.outcome == OrderStatus::Success {
            "success"
        } else {
            "failure"
        };
        let order_code: String =
            url::form_urlencoded::byte_serialize(self.order_code.as_bytes()).collect();
        match self.role {
            Some(role) => format!(
                "{frontend_url}/{}/payment/{result}?order_code={order_code}",
                role.as_str()
            ),
            None => format!("{frontend_url}/payment/{result}?order_code={order_code}"),
        }
    }
}

/// Applies verified gateway callbacks to orders and the ledger.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    ledger: Ledger,
}

impl Reconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateways: GatewayRegistry, ledger: Ledger) -> Self {
        Self {
            store,
            gateways,
            ledger,
        }
    }

    /// Verify a callback and settle its order.
    ///
    /// Safe to call any number of times for the same order: only the first
    /// verified callback changes state.
    ///
    /// # Errors
    ///
    /// - `ApiError::SignatureInvalid` if verification fails. Nothing changes.
    /// - `ApiError::Validation` for a malformed callback.
    /// - `ApiError::NotFound` for an unknown order or unconfigured gateway.
    pub fn reconcile(
        &self,
        gateway: Gateway,
        payload: &CallbackPayload,
    ) -> Result<RedirectHint, ApiError> {
        let adapter = self
            .gateways
            .get(gateway)
            .ok_or_else(|| ApiError::NotFound(format!("gateway not configured: {gateway}")))?;

        let result = adapter.verify_callback(payload).map_err(|e| {
            if matches!(e, GatewayError::SignatureInvalid) {
                tracing::warn!(
                    security = true,
                    gateway = %gateway,
                    delivery = ?payload.delivery,
                    "Rejected callback with invalid signature"
                );
            } else {
                tracing::warn!(gateway = %gateway, error = %e, "Rejected malformed callback");
            }
            ApiError::from(e)
        })?;

        let order = self
            .store
            .get_order_by_code(&result.order_code)?
            .filter(|o| o.gateway == gateway)
            .ok_or_else(|| ApiError::NotFound(format!("order not found: {}", result.order_code)))?;

        let amount_mismatch = result.outcome == CallbackOutcome::Success
            && result.verified_amount != order.fiat_amount;
        if amount_mismatch {
            tracing::warn!(
                security = true,
                order_code = %order.order_code,
                expected = order.fiat_amount,
                received = result.verified_amount,
                "Callback amount does not match order"
            );
        }

        let metadata = serde_json::json!({
            "delivery": payload.delivery,
            "gateway_reference": result.gateway_reference,
            "params": payload.params,
        });
        let transition = match result.outcome {
            CallbackOutcome::Success if !amount_mismatch => Transition::success(metadata),
            CallbackOutcome::Success => Transition::failed("amount mismatch", metadata),
            CallbackOutcome::Failed => Transition::failed("payment failed at gateway", metadata),
        };

        let (order, duplicate) = match self.store.transition_order(&order.order_code, &transition) {
            Ok(updated) => {
                tracing::info!(
                    order_code = %updated.order_code,
                    status = updated.status.as_str(),
                    "Order settled"
                );
                (updated, false)
            }
            Err(StoreError::AlreadyTerminal { order }) => {
                if order.status == OrderStatus::Failed
                    && result.outcome == CallbackOutcome::Success
                    && !amount_mismatch
                {
                    tracing::warn!(
                        order_code = %order.order_code,
                        failure_reason = ?order.failure_reason,
                        gateway_reference = ?result.gateway_reference,
                        "Gateway reports payment for a failed order; needs manual refund review"
                    );
                } else {
                    tracing::info!(
                        order_code = %order.order_code,
                        status = order.status.as_str(),
                        "Duplicate callback for settled order"
                    );
                }
                (*order, true)
            }
            Err(e) => return Err(e.into()),
        };

        if order.status == OrderStatus::Success {
            self.ensure_deposit(&order);
        }

        let role = match self.store.get_account(&order.user_id) {
            Ok(account) => account.map(|a| a.role),
            Err(e) => {
                tracing::debug!(user_id = %order.user_id, error = %e, "Role lookup failed");
                None
            }
        };

        Ok(RedirectHint {
            order_code: order.order_code,
            outcome: order.status,
            role,
            duplicate,
            amount_mismatch,
        })
    }

    /// Post the order's deposit; a failure is left for the reaper.
    fn ensure_deposit(&self, order: &RechargeOrder) {
        if let Err(e) = self.ledger.deposit_for_order(order) {
            tracing::error!(
                order_code = %order.order_code,
                user_id = %order.user_id,
                error = %e,
                "Failed to post deposit for paid order; will retry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use coin_recharge_core::{Account, UserId};
    use coin_recharge_store::MemoryStore;

    use crate::config::VnPayConfig;
    use crate::gateways::{Delivery, VnPayAdapter};
    use crate::reaper::{TimeoutReaper, TIMEOUT_REASON};

    struct Fixture {
        reconciler: Reconciler,
        store: Arc<MemoryStore>,
        adapter: VnPayAdapter,
        order: RechargeOrder,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user_id = UserId::generate();
        store
            .create_account(&Account::new(user_id, UserRole::Employer))
            .unwrap();

        let order = RechargeOrder::pending(
            user_id,
            500,
            50_000,
            Gateway::VnPay,
            "VNP240306000409000042".into(),
        );
        store.create_order(&order).unwrap();

        let adapter = VnPayAdapter::new(
            VnPayConfig {
                tmn_code: "TESTTMN1".into(),
                hash_secret: "VNPAYSECRET".into(),
                pay_url: "https://sandbox.example/pay".into(),
            },
            "http://localhost/callbacks/vnpay/return".into(),
        );
        let gateways = GatewayRegistry::new().with(Arc::new(adapter.clone()));
        let ledger = Ledger::new(store.clone());

        Fixture {
            reconciler: Reconciler::new(store.clone(), gateways, ledger),
            store,
            adapter,
            order,
        }
    }

    fn callback(adapter: &VnPayAdapter, code: &str, response: &str, vnp_amount: i64) -> CallbackPayload {
        let mut params: BTreeMap<String, String> = [
            ("vnp_Amount", vnp_amount.to_string()),
            ("vnp_ResponseCode", response.to_string()),
            ("vnp_TxnRef", code.to_string()),
            ("vnp_TransactionNo", "14226112".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let hash = adapter.sign(&params);
        params.insert("vnp_SecureHash".into(), hash);
        CallbackPayload {
            delivery: Delivery::Notification,
            params,
        }
    }

    fn balance(store: &MemoryStore, order: &RechargeOrder) -> i64 {
        store.get_account(&order.user_id).unwrap().unwrap().coin_balance
    }

    #[test]
    fn success_credits_once() {
        let f = fixture();
        let payload = callback(&f.adapter, &f.order.order_code, "00", 5_000_000);

        let first = f.reconciler.reconcile(Gateway::VnPay, &payload).unwrap();
        assert_eq!(first.outcome, OrderStatus::Success);
        assert_eq!(first.role, Some(UserRole::Employer));
        assert!(!first.duplicate);
        assert_eq!(balance(&f.store, &f.order), 500);

        let second = f.reconciler.reconcile(Gateway::VnPay, &payload).unwrap();
        assert_eq!(second.outcome, OrderStatus::Success);
        assert!(second.duplicate);
        assert_eq!(balance(&f.store, &f.order), 500);
        assert_eq!(f.store.list_transactions_by_user(&f.order.user_id).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_duplicates_credit_once() {
        let f = fixture();
        let payload = callback(&f.adapter, &f.order.order_code, "00", 5_000_000);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| f.reconciler.reconcile(Gateway::VnPay, &payload).unwrap());
            }
        });

        assert_eq!(balance(&f.store, &f.order), 500);
        assert_eq!(f.store.list_transactions_by_user(&f.order.user_id).unwrap().len(), 1);
    }

    #[test]
    fn failure_then_late_success_does_not_credit() {
        let f = fixture();

        let failed = f
            .reconciler
            .reconcile(
                Gateway::VnPay,
                &callback(&f.adapter, &f.order.order_code, "24", 5_000_000),
            )
            .unwrap();
        assert_eq!(failed.outcome, OrderStatus::Failed);

        let late = f
            .reconciler
            .reconcile(
                Gateway::VnPay,
                &callback(&f.adapter, &f.order.order_code, "00", 5_000_000),
            )
            .unwrap();
        assert_eq!(late.outcome, OrderStatus::Failed);
        assert!(late.duplicate);
        assert_eq!(balance(&f.store, &f.order), 0);
    }

    #[test]
    fn timed_out_order_ignores_late_success() {
        let f = fixture();
        let reaper = TimeoutReaper::new(
            f.store.clone(),
            Ledger::new(f.store.clone()),
            Duration::from_secs(15 * 60),
            Duration::from_secs(60),
        );

        let report = reaper
            .sweep(chrono::Utc::now() + chrono::Duration::minutes(16))
            .unwrap();
        assert_eq!(report.expired, 1);

        let late = f
            .reconciler
            .reconcile(
                Gateway::VnPay,
                &callback(&f.adapter, &f.order.order_code, "00", 5_000_000),
            )
            .unwrap();
        assert_eq!(late.outcome, OrderStatus::Failed);
        assert!(late.duplicate);

        let stored = f.store.get_order_by_code(&f.order.order_code).unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some(TIMEOUT_REASON));
        assert_eq!(balance(&f.store, &f.order), 0);
        assert!(f.store.list_transactions_by_user(&f.order.user_id).unwrap().is_empty());
        assert!(f.store.list_unposted_orders().unwrap().is_empty());
    }

    #[test]
    fn tampered_signature_leaves_order_pending() {
        let f = fixture();
        let mut payload = callback(&f.adapter, &f.order.order_code, "24", 5_000_000);
        payload.params.insert("vnp_ResponseCode".into(), "00".into());

        let err = f.reconciler.reconcile(Gateway::VnPay, &payload).unwrap_err();
        assert!(matches!(err, ApiError::SignatureInvalid));

        let order = f.store.get_order_by_code(&f.order.order_code).unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(balance(&f.store, &f.order), 0);
    }

    #[test]
    fn amount_mismatch_fails_order() {
        let f = fixture();
        let hint = f
            .reconciler
            .reconcile(
                Gateway::VnPay,
                &callback(&f.adapter, &f.order.order_code, "00", 100),
            )
            .unwrap();

        assert_eq!(hint.outcome, OrderStatus::Failed);
        assert!(hint.amount_mismatch);
        let order = f.store.get_order_by_code(&f.order.order_code).unwrap().unwrap();
        assert_eq!(order.failure_reason.as_deref(), Some("amount mismatch"));
        assert_eq!(balance(&f.store, &f.order), 0);
    }

    #[test]
    fn unknown_order_is_not_found() {
        let f = fixture();
        let err = f
            .reconciler
            .reconcile(Gateway::VnPay, &callback(&f.adapter, "VNP-nope", "00", 5_000_000))
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn redirect_url_includes_role_when_known() {
        let mut hint = RedirectHint {
            order_code: "240306_000409234567".into(),
            outcome: OrderStatus::Success,
            role: Some(UserRole::Candidate),
            duplicate: false,
            amount_mismatch: false,
        };
        assert_eq!(
            hint.redirect_url("http://localhost:3000"),
            "http://localhost:3000/candidate/payment/success?order_code=240306_000409234567"
        );

        hint.role = None;
        hint.outcome = OrderStatus::Failed;
        assert_eq!(
            hint.redirect_url("http://localhost:3000"),
            "http://localhost:3000/payment/failure?order_code=240306_000409234567"
        );
    }
}
