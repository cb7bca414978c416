//! Decimal hygiene for money and asset quantities.
//!
//! All amounts in the core are `rust_decimal::Decimal`, never floats. Fiat
//! amounts carry 2 fractional digits, crypto quantities 8. The store
//! persists both as strings; every parse and rescale goes through this
//! module so precision rules live in exactly one place.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Fractional digits for fiat (cash) amounts.
pub const FIAT_SCALE: u32 = 2;
/// Fractional digits for crypto asset quantities.
pub const CRYPTO_SCALE: u32 = 8;

#[derive(Debug, Error, PartialEq)]
pub enum MoneyError {
    #[error("invalid decimal string '{0}'")]
    InvalidDecimal(String),

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: Decimal },

    #[error("{field} has more than {max_scale} fractional digits: {value}")]
    TooPrecise {
        field: &'static str,
        max_scale: u32,
        value: Decimal,
    },
}

/// Validate a fiat amount from a request: strictly positive, at most 2 dp.
/// Returns the amount normalized to 2 dp.
pub fn validate_fiat_amount(field: &'static str, value: Decimal) -> Result<Decimal, MoneyError> {
    if value <= Decimal::ZERO {
        return Err(MoneyError::NotPositive { field, value });
    }
    if value.normalize().scale() > FIAT_SCALE {
        return Err(MoneyError::TooPrecise {
            field,
            max_scale: FIAT_SCALE,
            value,
        });
    }
    Ok(rescale_fiat(value))
}

/// Validate a crypto quantity from a request: strictly positive, at most 8 dp.
pub fn validate_quantity(field: &'static str, value: Decimal) -> Result<Decimal, MoneyError> {
    if value <= Decimal::ZERO {
        return Err(MoneyError::NotPositive { field, value });
    }
    if value.normalize().scale() > CRYPTO_SCALE {
        return Err(MoneyError::TooPrecise {
            field,
            max_scale: CRYPTO_SCALE,
            value,
        });
    }
    Ok(rescale_quantity(value))
}

/// Normalize a fiat amount to 2 dp (round half away from zero).
pub fn rescale_fiat(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FIAT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Normalize a crypto quantity to 8 dp (round half away from zero).
pub fn rescale_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CRYPTO_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Cost of `quantity` at `price`, as a fiat amount.
pub fn order_total(quantity: Decimal, price: Decimal) -> Decimal {
    rescale_fiat(quantity * price)
}

/// Parse a stored decimal string (store items persist amounts as strings).
pub fn parse_decimal(raw: &str) -> Result<Decimal, MoneyError> {
    raw.parse::<Decimal>()
        .map_err(|_| MoneyError::InvalidDecimal(raw.to_string()))
}
