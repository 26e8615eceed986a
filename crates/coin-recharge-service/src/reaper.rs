//! Background sweep of abandoned and half-settled orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use coin_recharge_core::Transition;
use coin_recharge_store::{Store, StoreError};

use crate::ledger::Ledger;

/// Reason recorded on orders the reaper fails.
pub const TIMEOUT_REASON: &str = "payment timeout";

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Orders moved to FAILED.
    pub expired: usize,
    /// Orders a callback settled first.
    pub raced: usize,
}

/// Fails pending orders past their timeout and re-posts missing deposits.
#[derive(Clone)]
pub struct TimeoutReaper {
    store: Arc<dyn Store>,
    ledger: Ledger,
    timeout: chrono::Duration,
    interval: Duration,
}

impl TimeoutReaper {
    /// Create a reaper.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, ledger: Ledger, timeout: Duration, interval: Duration) -> Self {
        Self {
            store,
            ledger,
            timeout: chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX),
            interval,
        }
    }

    /// Fail every pending order created at or before `now - timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing pending orders fails. Individual
    /// transition failures are logged and skipped.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();
        let Some(cutoff) = now.checked_sub_signed(self.timeout) else {
            return Ok(report);
        };

        for order in self.store.list_pending_orders_before(cutoff)? {
            let transition = Transition::failed(
                TIMEOUT_REASON,
                serde_json::json!({ "expired_at": now, "cutoff": cutoff }),
            );
            match self.store.transition_order(&order.order_code, &transition) {
                Ok(_) => {
                    report.expired += 1;
                    tracing::info!(
                        order_code = %order.order_code,
                        created_at = %order.created_at,
                        "Pending order timed out"
                    );
                }
                Err(StoreError::AlreadyTerminal { .. }) => report.raced += 1,
                Err(e) => {
                    tracing::error!(order_code = %order.order_code, error = %e, "Failed to expire order");
                }
            }
        }

        Ok(report)
    }

    /// Post deposits for SUCCESS orders that have none. Returns how many
    /// were posted.
    ///
    /// # Errors
    ///
    /// Returns an error if listing orders fails.
    pub fn settle_unposted(&self) -> Result<usize, StoreError> {
        let mut posted = 0;

        for order in self.store.list_unposted_orders()? {
            match self.ledger.deposit_for_order(&order) {
                Ok(applied) if applied.created => {
                    posted += 1;
                    tracing::warn!(
                        order_code = %order.order_code,
                        transaction_id = %applied.transaction.id,
                        "Posted missing deposit for paid order"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(order_code = %order.order_code, error = %e, "Deposit retry failed");
                }
            }
        }

        Ok(posted)
    }

    /// Run one full pass.
    pub fn run_once(&self, now: DateTime<Utc>) {
        match self.sweep(now) {
            Ok(report) if report.expired > 0 || report.raced > 0 => {
                tracing::info!(expired = report.expired, raced = report.raced, "Reaper sweep finished");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Reaper sweep failed"),
        }

        if let Err(e) = self.settle_unposted() {
            tracing::error!(error = %e, "Reaper settlement pass failed");
        }
    }

    /// Run on an interval until `shutdown` flips to `true` or its sender is
    /// dropped.
    #[must_use]
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                timeout_seconds = self.timeout.num_seconds(),
                interval_seconds = self.interval.as_secs(),
                "Timeout reaper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_once(Utc::now()),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Timeout reaper stopped");
        })
    }
}
