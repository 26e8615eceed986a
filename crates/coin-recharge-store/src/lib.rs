//! Storage layer for recharge orders, accounts and the credit ledger.
//!
//! Two backends implement [`Store`]:
//!
//! - [`MemoryStore`]: process-local, used by tests and single-node dev runs.
//! - `RocksStore` (feature `rocksdb-backend`): persistent, with column
//!   families for the order and ledger indexes.
//!
//! # Atomicity
//!
//! The two operations the financial invariants hinge on are single critical
//! sections in every backend:
//!
//! - [`Store::transition_order`] is a conditional update. Only the first
//!   caller to move an order out of `Pending` succeeds; every later caller
//!   gets [`StoreError::AlreadyTerminal`].
//! - [`Store::apply_entry`] moves the balance and appends the ledger entry
//!   together, and is idempotent per `(user_id, reference_type, reference_id)`.
//!
//! # Example
//!
//! ```
//! use coin_recharge_core::{Account, UserId, UserRole};
//! use coin_recharge_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! store.create_account(&Account::new(user_id, UserRole::Candidate)).unwrap();
//!
//! let account = store.get_account(&user_id).unwrap().unwrap();
//! assert_eq!(account.coin_balance, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use coin_recharge_core::{
    Account, CreditTransaction, EntryDraft, RechargeOrder, ReferenceType, TransactionId,
    Transition, UserId,
};

/// Outcome of [`Store::apply_entry`].
#[derive(Debug, Clone)]
pub struct AppliedEntry {
    /// The ledger entry (new, or the one already recorded for the reference).
    pub transaction: CreditTransaction,
    /// `false` when the reference had already been posted and nothing changed.
    pub created: bool,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer so the service can run against
/// `RocksDB` in production and memory in tests.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountExists` if the user already has one.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    // =========================================================================
    // Order Operations
    // =========================================================================

    /// Persist a new pending order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateOrderCode` if the code is taken.
    fn create_order(&self, order: &RechargeOrder) -> Result<()>;

    /// Look up an order by its gateway-facing code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_order_by_code(&self, order_code: &str) -> Result<Option<RechargeOrder>>;

    /// Record audit metadata on an order without touching its status.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist.
    fn attach_gateway_metadata(
        &self,
        order_code: &str,
        key: &str,
        metadata: serde_json::Value,
    ) -> Result<RechargeOrder>;

    /// Conditionally move an order from `Pending` to a terminal state.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the order doesn't exist.
    /// - `StoreError::AlreadyTerminal` if another caller got there first.
    /// - `StoreError::InvalidTransition` if `transition.to` is `Pending`.
    fn transition_order(&self, order_code: &str, transition: &Transition) -> Result<RechargeOrder>;

    /// Pending orders created at or before `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_pending_orders_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<RechargeOrder>>;

    /// SUCCESS orders whose deposit has not been posted, oldest first.
    ///
    /// An order joins this set on its SUCCESS transition and leaves it when
    /// `apply_entry` posts its `RechargeOrder` reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_unposted_orders(&self) -> Result<Vec<RechargeOrder>>;

    /// Orders for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RechargeOrder>>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Apply a balance change and append its ledger entry atomically.
    ///
    /// When the draft carries a reference that the same user has already
    /// posted, the existing entry is returned with `created: false` and
    /// nothing changes.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidEntry` if the draft fails validation.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance would go negative.
    fn apply_entry(&self, draft: EntryDraft) -> Result<AppliedEntry>;

    /// Get a ledger entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>>;

    /// Find the entry a user posted for a causing entity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_reference(
        &self,
        user_id: &UserId,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> Result<Option<CreditTransaction>>;

    /// All ledger entries for a user in the order they were applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(&self, user_id: &UserId) -> Result<Vec<CreditTransaction>>;
}

/// Apply a transition to a loaded order, mapping the rule violation to the
/// storage error both backends report.
pub(crate) fn transition_loaded(
    mut order: RechargeOrder,
    transition: &Transition,
) -> Result<RechargeOrder> {
    if !transition.to.is_terminal() {
        return Err(StoreError::InvalidTransition("target state must be terminal"));
    }

    match order.apply_transition(transition) {
        Ok(()) => Ok(order),
        Err(_) => Err(StoreError::AlreadyTerminal {
            order: Box::new(order),
        }),
    }
}

/// Apply a signed delta to a loaded account, mapping an overdraft to
/// `InsufficientCredits`.
pub(crate) fn debit_or_credit(account: &mut Account, amount: i64) -> Result<i64> {
    let balance = account.coin_balance;
    account
        .apply_delta(amount)
        .ok_or(StoreError::InsufficientCredits {
            balance,
            required: amount.saturating_neg(),
        })
}
