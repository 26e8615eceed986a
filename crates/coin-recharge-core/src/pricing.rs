//! Credit to fiat conversion.
//!
//! Coins are bought at a fixed integer rate (fiat minor units per coin).
//! All arithmetic is integer; there is no rounding anywhere.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::order::Gateway;

/// Default rate: 100 VND per coin.
pub const DEFAULT_CREDIT_RATE: i64 = 100;

/// Default smallest purchase, in coins.
pub const DEFAULT_MIN_CREDITS: i64 = 1;

/// Default largest purchase, in coins.
pub const DEFAULT_MAX_CREDITS: i64 = 1_000_000;

/// Convert a coin amount to the fiat amount charged for it.
///
/// # Errors
///
/// Returns `ValidationError` if `credit_amount` or `rate` is not positive, or
/// if the product overflows.
pub fn to_fiat_amount(credit_amount: i64, rate: i64) -> Result<i64, ValidationError> {
    if credit_amount <= 0 {
        return Err(ValidationError::NonPositiveCredits(credit_amount));
    }
    if rate <= 0 {
        return Err(ValidationError::InvalidRate(rate));
    }

    credit_amount
        .checked_mul(rate)
        .ok_or(ValidationError::AmountOverflow {
            credits: credit_amount,
            rate,
        })
}

/// Conversion rate and per-order purchase bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fiat minor units per coin.
    pub rate: i64,
    /// Smallest purchase, in coins.
    pub min_credits: i64,
    /// Largest purchase, in coins.
    pub max_credits: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_CREDIT_RATE,
            min_credits: DEFAULT_MIN_CREDITS,
            max_credits: DEFAULT_MAX_CREDITS,
        }
    }
}

/// A validated purchase request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    /// Coins to credit.
    pub credit_amount: i64,
    /// Fiat amount to charge.
    pub fiat_amount: i64,
    /// Gateway to charge through.
    pub gateway: Gateway,
}

impl PricingConfig {
    /// Validate a purchase and price it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the amount is not positive, is outside
    /// the configured bounds, or overflows when converted.
    pub fn quote(&self, credit_amount: i64, gateway: Gateway) -> Result<Quote, ValidationError> {
        if credit_amount <= 0 {
            return Err(ValidationError::NonPositiveCredits(credit_amount));
        }
        if credit_amount < self.min_credits || credit_amount > self.max_credits {
            return Err(ValidationError::CreditsOutOfRange {
                amount: credit_amount,
                min: self.min_credits,
                max: self.max_credits,
            });
        }

        Ok(Quote {
            credit_amount,
            fiat_amount: to_fiat_amount(credit_amount, self.rate)?,
            gateway,
        })
    }
}
