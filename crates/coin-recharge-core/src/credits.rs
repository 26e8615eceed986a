//! Ledger entry types.
//!
//! Every change to an account's coin balance is recorded as an immutable
//! [`CreditTransaction`]. Corrections are new entries, never edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::order::RechargeOrder;
use crate::{TransactionId, UserId};

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique entry ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Deposit or usage.
    pub transaction_type: TransactionType,

    /// What caused the entry.
    pub category: Category,

    /// Signed coin amount. Positive for deposits, negative for usage.
    pub amount: i64,

    /// Balance immediately after this entry was applied.
    pub balance_after: i64,

    /// Human-readable description.
    pub description: String,

    /// ID of the entity that caused this entry, if any.
    pub reference_id: Option<String>,

    /// Kind of entity `reference_id` points at.
    pub reference_type: Option<ReferenceType>,

    /// Free-form audit data.
    pub metadata: serde_json::Value,

    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

/// An entry that has not been applied yet.
///
/// The storage layer turns a draft into a [`CreditTransaction`] inside the
/// same critical section that moves the balance, so `balance_after` is
/// always the value the account actually held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDraft {
    /// The user whose balance changes.
    pub user_id: UserId,
    /// Deposit or usage.
    pub transaction_type: TransactionType,
    /// What caused the entry.
    pub category: Category,
    /// Signed coin amount.
    pub amount: i64,
    /// Human-readable description.
    pub description: String,
    /// ID of the causing entity.
    pub reference_id: Option<String>,
    /// Kind of the causing entity.
    pub reference_type: Option<ReferenceType>,
    /// Free-form audit data.
    pub metadata: serde_json::Value,
}

impl EntryDraft {
    /// Deposit entry for a paid recharge order, referencing the order id.
    #[must_use]
    pub fn recharge(order: &RechargeOrder) -> Self {
        Self {
            user_id: order.user_id,
            transaction_type: TransactionType::Deposit,
            category: Category::Recharge,
            amount: order.credit_amount,
            description: format!(
                "Recharged {} coins via {} (order {})",
                order.credit_amount,
                order.gateway.display_name(),
                order.order_code
            ),
            reference_id: Some(order.id.to_string()),
            reference_type: Some(ReferenceType::RechargeOrder),
            metadata: serde_json::json!({
                "order_code": order.order_code,
                "gateway": order.gateway,
                "fiat_amount": order.fiat_amount,
            }),
        }
    }

    /// Check that the category belongs to the type and the sign matches.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` describing the first violated rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.category.transaction_type() != self.transaction_type {
            return Err(ValidationError::CategoryMismatch {
                category: self.category,
                transaction_type: self.transaction_type,
            });
        }

        let sign_ok = match self.transaction_type {
            TransactionType::Deposit => self.amount > 0,
            TransactionType::Usage => self.amount < 0,
        };
        if !sign_ok {
            return Err(ValidationError::AmountSign {
                transaction_type: self.transaction_type,
                amount: self.amount,
            });
        }

        Ok(())
    }

    /// Seal the draft into a ledger entry with the given post-change balance.
    #[must_use]
    pub fn into_transaction(self, balance_after: i64) -> CreditTransaction {
        CreditTransaction {
            id: TransactionId::generate(),
            user_id: self.user_id,
            transaction_type: self.transaction_type,
            category: self.category,
            amount: self.amount,
            balance_after,
            description: self.description,
            reference_id: self.reference_id,
            reference_type: self.reference_type,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Coins added to the balance.
    Deposit,

    /// Coins spent.
    Usage,
}

/// Closed set of reasons a balance can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Coins bought through a payment gateway.
    Recharge,

    /// Compensating deposit for a reversed charge.
    Refund,

    /// Promotional coins granted by an admin.
    Bonus,

    /// Viewing a premium job posting.
    JobView,

    /// Unlocking a candidate CV.
    CvUnlock,

    /// Publishing a job posting.
    JobPost,

    /// Promoting a job posting.
    JobBoost,
}

impl Category {
    /// The only transaction type entries of this category may have.
    #[must_use]
    pub const fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Recharge | Self::Refund | Self::Bonus => TransactionType::Deposit,
            Self::JobView | Self::CvUnlock | Self::JobPost | Self::JobBoost => {
                TransactionType::Usage
            }
        }
    }
}

/// Kind of entity a ledger entry refers back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    /// A [`RechargeOrder`] (by `OrderId`).
    RechargeOrder,
    /// A job posting.
    Job,
    /// A CV.
    Cv,
    /// A job application.
    Application,
    /// Anything else.
    Other,
}

impl ReferenceType {
    /// Stable string form used in storage keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RechargeOrder => "recharge_order",
            Self::Job => "job",
            Self::Cv => "cv",
            Self::Application => "application",
            Self::Other => "other",
        }
    }
}
