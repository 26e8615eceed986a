//! Error types for storage.

use coin_recharge_core::{RechargeOrder, ValidationError};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },

    /// An account already exists for this user.
    #[error("account already exists: {user_id}")]
    AccountExists {
        /// The user that already has an account.
        user_id: String,
    },

    /// Order code collided with an existing order.
    #[error("duplicate order code: {order_code}")]
    DuplicateOrderCode {
        /// The colliding code.
        order_code: String,
    },

    /// Conditional transition lost: the order is no longer pending.
    ///
    /// Carries the stored order so callers can report its outcome.
    #[error("order {} already {}", .order.order_code, .order.status.as_str())]
    AlreadyTerminal {
        /// The order as currently stored.
        order: Box<RechargeOrder>,
    },

    /// Requested a transition into a non-terminal state.
    #[error("invalid transition target: {0}")]
    InvalidTransition(&'static str),

    /// A usage entry would drive the balance negative.
    #[error("insufficient coins: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Coins the entry needs.
        required: i64,
    },

    /// Ledger entry failed validation.
    #[error("invalid ledger entry: {0}")]
    InvalidEntry(#[from] ValidationError),
}
