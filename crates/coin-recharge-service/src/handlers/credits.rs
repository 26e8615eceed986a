//! Credit balance, history and usage handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use coin_recharge_core::{
    Category, CreditTransaction, EntryDraft, ReferenceType, TransactionType, UserId,
};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::ledger::{HistoryPage, HistoryQuery, LedgerSummary, SummaryQuery};
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Current coin balance.
    pub coin_balance: i64,
}

/// Get current coin balance.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(BalanceResponse {
        coin_balance: account.coin_balance,
    }))
}

/// Filtered transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    Ok(Json(state.ledger.history(&auth.user_id, &query)?))
}

/// Totals by type and category.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<LedgerSummary>, ApiError> {
    Ok(Json(state.ledger.summary(&auth.user_id, &query)?))
}

/// Usage request from a platform service.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// User to charge.
    pub user_id: UserId,
    /// What the coins were spent on. Must be a usage category.
    pub category: Category,
    /// Coins to spend (positive).
    pub amount: i64,
    /// Human-readable description.
    pub description: String,
    /// ID of the purchased item, for idempotent retries.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Kind of the purchased item.
    #[serde(default)]
    pub reference_type: Option<ReferenceType>,
    /// Free-form audit data.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Spend coins on behalf of a user.
///
/// Retrying with the same reference returns the original entry.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<UsageRequest>,
) -> Result<Json<CreditTransaction>, ApiError> {
    if body.amount <= 0 {
        return Err(ApiError::Validation("amount must be positive".into()));
    }
    if body.category.transaction_type() != TransactionType::Usage {
        return Err(ApiError::Validation(format!(
            "{:?} is not a usage category",
            body.category
        )));
    }
    if body.reference_id.is_some() != body.reference_type.is_some() {
        return Err(ApiError::Validation(
            "reference_id and reference_type must be given together".into(),
        ));
    }

    let transaction = state.ledger.record(EntryDraft {
        user_id: body.user_id,
        transaction_type: TransactionType::Usage,
        category: body.category,
        amount: -body.amount,
        description: body.description,
        reference_id: body.reference_id,
        reference_type: body.reference_type,
        metadata: body.metadata.unwrap_or_else(|| {
            serde_json::json!({ "service": service.service_name })
        }),
    })?;

    Ok(Json(transaction))
}
