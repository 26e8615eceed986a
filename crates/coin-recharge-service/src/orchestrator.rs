//! Recharge order creation.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use coin_recharge_core::{Gateway, PricingConfig, RechargeOrder, Transition, UserId};
use coin_recharge_store::{Store, StoreError};

use crate::error::ApiError;
use crate::gateways::{ClientContext, GatewayRegistry};

/// Attempts at finding an unused order code before giving up.
const ORDER_CODE_ATTEMPTS: usize = 3;

/// A pending order the payer can now be sent to pay.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    /// Gateway-facing order code.
    pub order_code: String,
    /// Payment page.
    pub redirect_url: String,
    /// Amount to be charged, in VND.
    pub fiat_amount: i64,
}

/// Creates recharge orders and hands them to the gateway.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    pricing: PricingConfig,
}

impl Orchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateways: GatewayRegistry, pricing: PricingConfig) -> Self {
        Self {
            store,
            gateways,
            pricing,
        }
    }

    /// Validate, persist as pending, and ask the gateway for a payment page.
    ///
    /// # Errors
    ///
    /// - `ApiError::Validation` for a bad amount or unconfigured gateway.
    /// - `ApiError::NotFound` if the user has no account.
    /// - `ApiError::GatewayUnavailable` if the gateway call fails. The order
    ///   is marked failed and the caller may retry with a new order.
    pub async fn create_order(
        &self,
        user_id: UserId,
        credit_amount: i64,
        gateway: Gateway,
        ctx: &ClientContext,
    ) -> Result<CreatedOrder, ApiError> {
        let quote = self.pricing.quote(credit_amount, gateway)?;
        let adapter = self
            .gateways
            .get(gateway)
            .ok_or_else(|| ApiError::Validation(format!("gateway not supported: {gateway}")))?;

        if self.store.get_account(&user_id)?.is_none() {
            return Err(ApiError::NotFound("Account not found".into()));
        }

        let order = self.persist_pending(user_id, quote.credit_amount, quote.fiat_amount, gateway)?;

        tracing::info!(
            user_id = %user_id,
            order_code = %order.order_code,
            gateway = %gateway,
            credit_amount = order.credit_amount,
            fiat_amount = order.fiat_amount,
            "Recharge order created"
        );

        match adapter.build_order_request(&order, ctx).await {
            Ok(target) => {
                self.store
                    .attach_gateway_metadata(&order.order_code, "request", target.raw)?;

                Ok(CreatedOrder {
                    order_code: order.order_code,
                    redirect_url: target.url,
                    fiat_amount: order.fiat_amount,
                })
            }
            Err(e) => {
                tracing::warn!(
                    order_code = %order.order_code,
                    gateway = %gateway,
                    error = %e,
                    "Gateway failed to create payment"
                );

                let reason = format!("gateway error: {e}");
                match self.store.transition_order(
                    &order.order_code,
                    &Transition::failed(reason, serde_json::Value::Null),
                ) {
                    Ok(_) | Err(StoreError::AlreadyTerminal { .. }) => {}
                    Err(store_err) => {
                        tracing::error!(
                            order_code = %order.order_code,
                            error = %store_err,
                            "Failed to mark order as failed; reaper will expire it"
                        );
                    }
                }

                Err(ApiError::GatewayUnavailable(format!(
                    "{} is unavailable, please try again",
                    gateway.display_name()
                )))
            }
        }
    }

    fn persist_pending(
        &self,
        user_id: UserId,
        credit_amount: i64,
        fiat_amount: i64,
        gateway: Gateway,
    ) -> Result<RechargeOrder, ApiError> {
        for attempt in 1..=ORDER_CODE_ATTEMPTS {
            let nonce = rand::thread_rng().gen_range(0..1_000_000);
            let code = gateway.order_code(Utc::now(), nonce);
            let order = RechargeOrder::pending(user_id, credit_amount, fiat_amount, gateway, code);

            match self.store.create_order(&order) {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateOrderCode { order_code }) => {
                    tracing::debug!(order_code = %order_code, attempt, "Order code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ApiError::Internal(
            "could not allocate a unique order code".into(),
        ))
    }
}
