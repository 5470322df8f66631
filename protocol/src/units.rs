//! # Amounts, Units & Proportional Math
//!
//! All balances are `u128` integers in the smallest denomination. SHM and the
//! reward token both use 18 decimals, so "3 SHM" is `3 * 10^18` on the
//! ledger. Decimal strings only exist at the edges: [`parse_units`] turns
//! user input into an [`Amount`], [`format_units`] goes the other way.
//!
//! Reward distribution multiplies two 18-decimal quantities before dividing,
//! which overflows `u128` for realistic balances. [`mul_div_floor`] widens
//! to 256 bits for the intermediate product.
//!
//! JSON clients (browsers in particular) lose precision above 2^53, so
//! amounts travel through JSON as base-10 strings; see [`amount_string`].

use thiserror::Error;

/// An amount in the smallest denomination of a currency.
pub type Amount = u128;

/// Identifier of a vault inside a deposit vault contract.
pub type VaultId = u64;

uint::construct_uint! {
    /// 256-bit unsigned integer for intermediate products.
    pub struct U256(4);
}

/// Errors produced by unit conversion and proportional math.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    /// The decimal string could not be parsed.
    #[error("invalid decimal amount '{0}'")]
    InvalidNumber(String),

    /// More fractional digits were supplied than the currency supports.
    #[error("too many decimal places: {given} given, {max} supported")]
    TooManyDecimals {
        /// Fractional digits in the input.
        given: usize,
        /// Decimals of the currency.
        max: u8,
    },

    /// The value does not fit in an [`Amount`].
    #[error("amount overflow")]
    Overflow,

    /// Division by a zero denominator.
    #[error("division by zero")]
    DivisionByZero,
}

/// `10^decimals` as an [`Amount`].
pub fn unit(decimals: u8) -> Result<Amount, UnitsError> {
    10u128
        .checked_pow(u32::from(decimals))
        .ok_or(UnitsError::Overflow)
}

/// Parses a decimal string such as `"3"` or `"0.25"` into smallest units.
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let value = value.trim();
    let invalid = || UnitsError::InvalidNumber(value.to_string());

    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > usize::from(decimals) {
        return Err(UnitsError::TooManyDecimals {
            given: fraction.len(),
            max: decimals,
        });
    }

    let scale = unit(decimals)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<Amount>().map_err(|_| UnitsError::Overflow)?
    };

    let fraction_units = if fraction.is_empty() {
        0
    } else {
        let padding = u8::try_from(usize::from(decimals) - fraction.len())
            .map_err(|_| UnitsError::Overflow)?;
        fraction
            .parse::<Amount>()
            .map_err(|_| UnitsError::Overflow)?
            .checked_mul(unit(padding)?)
            .ok_or(UnitsError::Overflow)?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or(UnitsError::Overflow)
}

/// Renders smallest units as a decimal string, always with at least one
/// fractional digit (`1000000000000000000` at 18 decimals is `"1.0"`).
pub fn format_units(amount: Amount, decimals: u8) -> String {
    let Ok(scale) = unit(decimals) else {
        return amount.to_string();
    };
    if decimals == 0 {
        return format!("{amount}.0");
    }

    let whole = amount / scale;
    let fraction = amount % scale;
    let padded = format!("{:0width$}", fraction, width = usize::from(decimals));
    let trimmed = padded.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

/// `floor(a * b / denominator)` with a 256-bit intermediate product.
pub fn mul_div_floor(a: Amount, b: Amount, denominator: Amount) -> Result<Amount, UnitsError> {
    if denominator == 0 {
        return Err(UnitsError::DivisionByZero);
    }

    let product = U256::from(a) * U256::from(b);
    let quotient = product / U256::from(denominator);
    if quotient > U256::from(Amount::MAX) {
        return Err(UnitsError::Overflow);
    }
    Ok(quotient.as_u128())
}

/// Serde adapter for [`Amount`] fields.
///
/// Human-readable formats (JSON) get a base-10 string, binary formats
/// (bincode) a plain `u128`. On input JSON also accepts a number that fits
/// in a `u64`.
///
/// ```ignore
/// #[serde(with = "shm_protocol::units::amount_string")]
/// amount: Amount,
/// ```
pub mod amount_string {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.collect_str(value)
        } else {
            serializer.serialize_u128(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            Amount::deserialize(deserializer)
        }
    }

    struct AmountVisitor;

    impl<'de> Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a base-10 integer string or an unsigned integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
            Ok(Amount::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
            Ok(v)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
            v.parse()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}
