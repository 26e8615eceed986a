//! Admin handlers: manual grants and ledger audits.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use coin_recharge_core::{
    Category, CreditTransaction, EntryDraft, ReferenceType, TransactionType, UserId,
};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::ledger::ReplayReport;
use crate::state::AppState;

/// Grant request.
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    /// User to credit.
    pub user_id: UserId,
    /// `bonus` or `refund`.
    pub category: Category,
    /// Coins to add (positive).
    pub amount: i64,
    /// Why the coins were granted.
    pub reason: String,
    /// Entity this grant compensates, if any.
    #[serde(default)]
    pub reference_id: Option<String>,
    /// Kind of entity `reference_id` points at.
    #[serde(default)]
    pub reference_type: Option<ReferenceType>,
}

/// Grant bonus or refund coins.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<GrantRequest>,
) -> Result<Json<CreditTransaction>, ApiError> {
    if !matches!(body.category, Category::Bonus | Category::Refund) {
        return Err(ApiError::Validation(
            "admins may only grant bonus or refund coins".into(),
        ));
    }
    if body.amount <= 0 {
        return Err(ApiError::Validation("amount must be positive".into()));
    }
    if body.reference_id.is_some() != body.reference_type.is_some() {
        return Err(ApiError::Validation(
            "reference_id and reference_type must be given together".into(),
        ));
    }

    let transaction = state.ledger.record(EntryDraft {
        user_id: body.user_id,
        transaction_type: TransactionType::Deposit,
        category: body.category,
        amount: body.amount,
        description: body.reason.clone(),
        reference_id: body.reference_id,
        reference_type: body.reference_type,
        metadata: serde_json::json!({ "admin_id": admin.admin_id, "reason": body.reason }),
    })?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %body.user_id,
        amount = body.amount,
        category = ?body.category,
        "Admin granted credits"
    );

    Ok(Json(transaction))
}

/// Replay a user's ledger and compare it with the stored balance.
pub async fn verify_ledger(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<UserId>,
) -> Result<Json<ReplayReport>, ApiError> {
    let report = state.ledger.verify_replay(&user_id)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        consistent = report.is_consistent(),
        "Ledger replay requested"
    );

    Ok(Json(report))
}
