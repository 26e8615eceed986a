//! Credit ledger: the only writer of coin balances.
//!
//! Every balance change goes through [`Ledger::record`], which hands the
//! draft to [`Store::apply_entry`] so the balance and its entry move
//! together. History and summaries are computed from the entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coin_recharge_core::{
    Category, CreditTransaction, EntryDraft, RechargeOrder, TransactionId, TransactionType,
    UserId,
};
use coin_recharge_store::{AppliedEntry, Store};

use crate::error::ApiError;

/// Default history page size.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest history page a caller may ask for.
pub const MAX_PAGE_SIZE: usize = 100;

/// Ledger history filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    /// 1-based page number (default 1).
    pub page: Option<usize>,
    /// Page size (default 20, max 100).
    pub limit: Option<usize>,
    /// Only deposits or only usage.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    /// Only one category.
    pub category: Option<Category>,
    /// First day included (UTC).
    pub start_date: Option<NaiveDate>,
    /// Last day included (UTC), through 23:59:59.999.
    pub end_date: Option<NaiveDate>,
}

/// Pagination metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page (1-based).
    pub page: usize,
    /// Page size.
    pub limit: usize,
    /// Entries matching the filters.
    pub total: usize,
    /// Pages at this size.
    pub total_pages: usize,
}

/// One page of ledger history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    /// Entries on this page.
    pub entries: Vec<CreditTransaction>,
    /// Where this page sits.
    pub pagination: Pagination,
}

/// Summary date range.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    /// First day included (UTC).
    pub start_date: Option<NaiveDate>,
    /// Last day included (UTC).
    pub end_date: Option<NaiveDate>,
}

/// Per-category aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    /// Number of entries.
    pub count: usize,
    /// Sum of absolute amounts.
    pub total: i64,
}

/// Aggregates over a user's ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    /// Balance right now, regardless of the date range.
    pub current_balance: i64,
    /// Coins deposited in range.
    pub total_deposits: i64,
    /// Coins spent in range (positive number).
    pub total_usage: i64,
    /// Breakdown by category.
    pub by_category: BTreeMap<Category, CategoryTotal>,
}

/// Result of replaying a user's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Entries replayed.
    pub entries: usize,
    /// Balance the replay arrives at.
    pub replayed_balance: i64,
    /// Balance stored on the account.
    pub account_balance: i64,
    /// First entry whose `balance_after` disagrees with the replay.
    pub first_mismatch: Option<TransactionId>,
}

impl ReplayReport {
    /// Whether every entry and the account agree with the replay.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.first_mismatch.is_none() && self.replayed_balance == self.account_balance
    }
}

/// The credit ledger.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    /// Create a ledger over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply a balance change and append its entry.
    ///
    /// A draft whose `(reference_type, reference_id)` the user already posted
    /// returns the existing entry unchanged.
    ///
    /// # Errors
    ///
    /// - `ApiError::Validation` for a category/type or sign mismatch.
    /// - `ApiError::NotFound` if the account doesn't exist.
    /// - `ApiError::InsufficientCredits` if a usage would overdraw.
    pub fn record(&self, draft: EntryDraft) -> Result<CreditTransaction, ApiError> {
        Ok(self.apply(draft)?.transaction)
    }

    /// Post the deposit for a paid order, at most once.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::record`].
    pub fn deposit_for_order(&self, order: &RechargeOrder) -> Result<AppliedEntry, ApiError> {
        self.apply(EntryDraft::recharge(order))
    }

    fn apply(&self, draft: EntryDraft) -> Result<AppliedEntry, ApiError> {
        let user_id = draft.user_id;
        let category = draft.category;
        let applied = self.store.apply_entry(draft)?;

        if applied.created {
            tracing::info!(
                user_id = %user_id,
                transaction_id = %applied.transaction.id,
                category = ?category,
                amount = applied.transaction.amount,
                balance_after = applied.transaction.balance_after,
                "Ledger entry recorded"
            );
        } else {
            tracing::debug!(
                user_id = %user_id,
                transaction_id = %applied.transaction.id,
                reference_id = ?applied.transaction.reference_id,
                "Reference already posted, returning existing entry"
            );
        }

        Ok(applied)
    }

    /// Filtered, paginated history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the account doesn't exist.
    pub fn history(&self, user_id: &UserId, query: &HistoryQuery) -> Result<HistoryPage, ApiError> {
        self.require_account(user_id)?;

        let page = query.page.unwrap_or(1).max(1);
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let (from, to) = date_bounds(query.start_date, query.end_date);

        let mut entries: Vec<_> = self
            .store
            .list_transactions_by_user(user_id)?
            .into_iter()
            .filter(|tx| query.transaction_type.map_or(true, |t| tx.transaction_type == t))
            .filter(|tx| query.category.map_or(true, |c| tx.category == c))
            .filter(|tx| in_range(tx.created_at, from, to))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = entries.len();
        let entries = entries
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(HistoryPage {
            entries,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        })
    }

    /// Totals over a date range, plus the current balance.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the account doesn't exist.
    pub fn summary(&self, user_id: &UserId, query: &SummaryQuery) -> Result<LedgerSummary, ApiError> {
        let account = self.require_account(user_id)?;
        let (from, to) = date_bounds(query.start_date, query.end_date);

        let mut summary = LedgerSummary {
            current_balance: account.coin_balance,
            total_deposits: 0,
            total_usage: 0,
            by_category: BTreeMap::new(),
        };

        for tx in self.store.list_transactions_by_user(user_id)? {
            if !in_range(tx.created_at, from, to) {
                continue;
            }
            match tx.transaction_type {
                TransactionType::Deposit => summary.total_deposits += tx.amount,
                TransactionType::Usage => summary.total_usage += tx.amount.abs(),
            }
            let bucket = summary.by_category.entry(tx.category).or_default();
            bucket.count += 1;
            bucket.total += tx.amount.abs();
        }

        Ok(summary)
    }

    /// Replay a user's entries from zero and compare with what is stored.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::NotFound` if the account doesn't exist.
    pub fn verify_replay(&self, user_id: &UserId) -> Result<ReplayReport, ApiError> {
        let account = self.require_account(user_id)?;
        let entries = self.store.list_transactions_by_user(user_id)?;

        let mut balance = 0i64;
        let mut first_mismatch = None;
        for tx in &entries {
            balance = balance.saturating_add(tx.amount);
            if first_mismatch.is_none() && tx.balance_after != balance {
                first_mismatch = Some(tx.id);
            }
        }

        let report = ReplayReport {
            entries: entries.len(),
            replayed_balance: balance,
            account_balance: account.coin_balance,
            first_mismatch,
        };
        if !report.is_consistent() {
            tracing::error!(user_id = %user_id, report = ?report, "Ledger replay mismatch");
        }
        Ok(report)
    }

    fn require_account(&self, user_id: &UserId) -> Result<coin_recharge_core::Account, ApiError> {
        self.store
            .get_account(user_id)?
            .ok_or_else(|| ApiError::NotFound("Account not found".into()))
    }
}

/// Inclusive UTC bounds; the end date covers its whole day.
fn date_bounds(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let from = start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let to = end
        .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
        .map(|dt| dt.and_utc());
    (from, to)
}

fn in_range(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| at >= f) && to.map_or(true, |t| at <= t)
}
