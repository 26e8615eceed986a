//! Core types for the coin recharge service.
//!
//! - **Identifiers**: `UserId`, `OrderId`, `TransactionId`
//! - **Accounts**: `Account`, `UserRole`
//! - **Orders**: `RechargeOrder`, `OrderStatus`, `Gateway`
//! - **Ledger**: `CreditTransaction`, `EntryDraft`, `TransactionType`, `Category`
//! - **Pricing**: `to_fiat_amount`, `PricingConfig`
//!
//! # Coin unit
//!
//! Coins are whole numbers stored as `i64`. Fiat amounts are `i64` in the
//! currency's minor unit (VND has none, so 1 unit = 1 dong).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;
pub mod order;
pub mod pricing;

pub use account::{Account, UserRole};
pub use credits::{Category, CreditTransaction, EntryDraft, ReferenceType, TransactionType};
pub use error::ValidationError;
pub use ids::{IdError, OrderId, TransactionId, UserId};
pub use order::{vietnam_offset, Gateway, OrderStatus, RechargeOrder, Transition};
pub use pricing::{to_fiat_amount, PricingConfig, Quote, DEFAULT_CREDIT_RATE};
