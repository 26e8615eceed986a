//! Validation errors shared by every layer.

use crate::credits::{Category, TransactionType};

/// Input that was rejected before anything was persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Credit amount was zero or negative.
    #[error("credit amount must be a positive integer, got {0}")]
    NonPositiveCredits(i64),

    /// Credit amount outside the configured purchase bounds.
    #[error("credit amount {amount} outside allowed range {min}..={max}")]
    CreditsOutOfRange {
        /// Requested amount.
        amount: i64,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// Conversion rate was zero or negative.
    #[error("conversion rate must be positive, got {0}")]
    InvalidRate(i64),

    /// `credits * rate` does not fit in an `i64`.
    #[error("fiat amount overflows for {credits} credits at rate {rate}")]
    AmountOverflow {
        /// Requested credits.
        credits: i64,
        /// Conversion rate.
        rate: i64,
    },

    /// Gateway name is not one of the supported providers.
    #[error("unsupported gateway: {0}")]
    UnsupportedGateway(String),

    /// Ledger category used with the wrong transaction type.
    #[error("category {category:?} cannot be used for {transaction_type:?} entries")]
    CategoryMismatch {
        /// The category supplied.
        category: Category,
        /// The type supplied.
        transaction_type: TransactionType,
    },

    /// Ledger amount sign does not match the transaction type.
    #[error("amount {amount} has the wrong sign for a {transaction_type:?} entry")]
    AmountSign {
        /// The type supplied.
        transaction_type: TransactionType,
        /// The amount supplied.
        amount: i64,
    },
}
