//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use coin_recharge_core::ValidationError;
use coin_recharge_store::StoreError;

use crate::gateways::GatewayError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Callback signature did not verify.
    #[error("invalid signature")]
    SignatureInvalid,

    /// Payment gateway could not start the payment. Retryable.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::SignatureInvalid => "signature_invalid",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            Self::InsufficientCredits { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::SignatureInvalid => (StatusCode::BAD_REQUEST, self.to_string(), None),
            Self::GatewayUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg.clone(),
                Some(serde_json::json!({ "retryable": true })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::InsufficientCredits { balance, required } => {
                Self::InsufficientCredits { balance, required }
            }
            StoreError::AccountExists { .. } => Self::Conflict("Account already exists".into()),
            StoreError::DuplicateOrderCode { order_code } => {
                Self::Conflict(format!("order code already in use: {order_code}"))
            }
            StoreError::AlreadyTerminal { order } => Self::Conflict(format!(
                "order {} is already {}",
                order.order_code,
                order.status.as_str()
            )),
            StoreError::InvalidEntry(e) => Self::Validation(e.to_string()),
            StoreError::InvalidTransition(msg) => Self::Internal(msg.to_string()),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SignatureInvalid => Self::SignatureInvalid,
            GatewayError::MalformedCallback(msg) => Self::Validation(msg),
            GatewayError::Unavailable(msg) => Self::GatewayUnavailable(msg),
            GatewayError::Http(e) => Self::GatewayUnavailable(e.to_string()),
            GatewayError::Configuration(msg) => Self::Internal(msg),
        }
    }
}
