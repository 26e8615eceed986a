//! Account types.
//!
//! The account is the owner of the live coin balance. Ledger entries are
//! point-in-time snapshots of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A credit account for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,

    /// Current coin balance. Never negative.
    pub coin_balance: i64,

    /// The user's role, used to pick the post-payment landing page.
    pub role: UserRole,

    /// Lifetime coins deposited (recharges, refunds, bonuses).
    pub lifetime_deposited: i64,

    /// Lifetime coins spent.
    pub lifetime_used: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            coin_balance: 0,
            role,
            lifetime_deposited: 0,
            lifetime_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a deduction.
    #[must_use]
    pub fn has_sufficient_coins(&self, amount: i64) -> bool {
        self.coin_balance >= amount
    }

    /// Apply a signed balance change and bump the lifetime counters.
    ///
    /// Returns the new balance, or `None` if the change would drive the
    /// balance negative or overflow. Storage backends call this inside
    /// their write critical section.
    pub fn apply_delta(&mut self, delta: i64) -> Option<i64> {
        let next = self.coin_balance.checked_add(delta)?;
        if next < 0 {
            return None;
        }

        self.coin_balance = next;
        if delta > 0 {
            self.lifetime_deposited += delta;
        } else {
            self.lifetime_used += delta.abs();
        }
        self.updated_at = Utc::now();

        Some(next)
    }
}

/// Role of the account owner on the surrounding platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Job seeker.
    Candidate,

    /// Company posting jobs.
    Employer,

    /// Platform administrator.
    Admin,
}

impl UserRole {
    /// Path segment used when building landing page URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::Employer => "employer",
            Self::Admin => "admin",
        }
    }
}
