//! Fixed-point quote → decimal price conversion

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{DecimalPrice, RawQuote};

/// Largest scale a `Decimal` can carry
const MAX_SCALE: u32 = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("negative mantissa {0}")]
    Negative(i64),

    #[error("{mantissa}e{exponent} exceeds the decimal range")]
    OutOfRange { mantissa: i64, exponent: i32 },
}

/// Compute `mantissa * 10^exponent` exactly.
///
/// Exponents below -28 lose the digits past Decimal's 28-digit scale.
pub fn normalize(quote: &RawQuote) -> Result<DecimalPrice, NormalizationError> {
    if quote.mantissa < 0 {
        return Err(NormalizationError::Negative(quote.mantissa));
    }
    if quote.mantissa == 0 {
        return Ok(DecimalPrice::new(Decimal::ZERO).unwrap_or_default());
    }

    let out_of_range = || NormalizationError::OutOfRange {
        mantissa: quote.mantissa,
        exponent: quote.exponent,
    };

    let value = if quote.exponent >= 0 {
        let exponent = quote.exponent as u32;
        if exponent > MAX_SCALE {
            return Err(out_of_range());
        }
        let mut value = Decimal::from(quote.mantissa);
        for _ in 0..exponent {
            value = value.checked_mul(Decimal::TEN).ok_or_else(out_of_range)?;
        }
        value
    } else {
        let scale = quote.exponent.unsigned_abs();
        if scale <= MAX_SCALE {
            Decimal::new(quote.mantissa, scale)
        } else {
            let mut value = Decimal::new(quote.mantissa, MAX_SCALE);
            for _ in 0..(scale - MAX_SCALE) {
                if value.is_zero() {
                    break;
                }
                value /= Decimal::TEN;
            }
            value
        }
    };

    DecimalPrice::new(value).ok_or(NormalizationError::Negative(quote.mantissa))
}
