use crate::error::PaymentError;
use ethers::{
    types::U256,
    utils::{format_units, parse_units, ParseUnits},
};

/// USDC precision.
pub const TOKEN_DECIMALS: u32 = 6;

/// Converts a decimal token amount (e.g. `5.25` USDC) into base units.
///
/// Digits beyond the sixth decimal place are truncated. Amounts that are not
/// finite, not positive, or that truncate to zero base units are rejected.
pub fn to_base_units(amount: f64) -> Result<U256, PaymentError> {
    if !amount.is_finite() {
        return Err(PaymentError::InvalidAmount(format!("{} is not finite", amount)));
    }
    if amount <= 0.0 {
        return Err(PaymentError::InvalidAmount(format!("{} must be positive", amount)));
    }

    let units = parse_units(amount.to_string(), TOKEN_DECIMALS)
        .map_err(|e| PaymentError::InvalidAmount(format!("{}: {}", amount, e)))?;

    match units {
        ParseUnits::U256(value) if !value.is_zero() => Ok(value),
        _ => Err(PaymentError::InvalidAmount(format!(
            "{} is below the smallest unit",
            amount
        ))),
    }
}

/// Inverse of [`to_base_units`].
pub fn from_base_units(units: U256) -> Result<f64, PaymentError> {
    format_base_units(units)?
        .parse()
        .map_err(|_| PaymentError::InvalidAmount(format!("{} base units", units)))
}

/// Six-decimal string form, e.g. `5000000` -> `"5.000000"`.
pub fn format_base_units(units: U256) -> Result<String, PaymentError> {
    format_units(units, TOKEN_DECIMALS)
        .map_err(|e| PaymentError::InvalidAmount(format!("{} base units: {}", units, e)))
}
