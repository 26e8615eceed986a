//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use coin_recharge_core::{Account, UserRole};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Role on the platform.
    pub role: UserRole,
    /// Current coin balance.
    pub coin_balance: i64,
    /// Coins ever deposited.
    pub lifetime_deposited: i64,
    /// Coins ever spent.
    pub lifetime_used: i64,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            role: account.role,
            coin_balance: account.coin_balance,
            lifetime_deposited: account.lifetime_deposited,
            lifetime_used: account.lifetime_used,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Role of the user (default: candidate).
    #[serde(default = "default_role")]
    pub role: UserRole,
}

fn default_role() -> UserRole {
    UserRole::Candidate
}

/// Register a billing account for the authenticated user.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    if body.role == UserRole::Admin {
        return Err(ApiError::Forbidden);
    }

    let account = Account::new(auth.user_id, body.role);
    state.store.create_account(&account)?;

    tracing::info!(user_id = %auth.user_id, role = body.role.as_str(), "Account created");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))?;

    Ok(Json(AccountResponse::from(&account)))
}
