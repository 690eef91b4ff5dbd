//! Field-element and U256 codecs.
//!
//! All value arithmetic in the engine goes through `num-bigint`; floating
//! point never touches an amount. Hex is canonical lowercase with a `0x`
//! prefix and no leading zeros.

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;

use crate::error::CoreError;

/// A 256-bit unsigned value as the `(low, high)` felt pair Starknet calldata
/// expects. Both halves are < 2^128.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct U256 {
    pub low: Felt,
    pub high: Felt,
}

/// Parse any valid hex string (with or without `0x`, any case) into a felt.
pub fn felt_from_hex(s: &str) -> Result<Felt, CoreError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidInput(format!("not a hex felt: {s:?}")));
    }
    Felt::from_hex(&format!("0x{digits}"))
        .map_err(|e| CoreError::InvalidInput(format!("not a valid felt {s:?}: {e}")))
}

/// Canonical lowercase `0x`-prefixed hex without leading zeros.
pub fn felt_to_hex(f: &Felt) -> String {
    format!("{f:#x}")
}

/// Split an arbitrary-precision unsigned value into a `(low, high)` pair.
///
/// `low = v mod 2^128`, `high = v >> 128`. Values at or above 2^256 are
/// rejected.
pub fn u256_from_bigint(v: &BigUint) -> Result<U256, CoreError> {
    if v.bits() > 256 {
        return Err(CoreError::InvalidInput(format!(
            "value does not fit in 256 bits: {v}"
        )));
    }
    let mask = (BigUint::from(1u8) << 128) - BigUint::from(1u8);
    let low = v & &mask;
    let high = v >> 128;
    Ok(U256 {
        low: biguint_to_felt(&low)?,
        high: biguint_to_felt(&high)?,
    })
}

/// Recombine a `(low, high)` pair into the value it encodes.
///
/// Rejects halves that are not themselves < 2^128.
pub fn bigint_from_u256(low: &Felt, high: &Felt) -> Result<BigUint, CoreError> {
    let low = felt_to_biguint(low);
    let high = felt_to_biguint(high);
    if low.bits() > 128 || high.bits() > 128 {
        return Err(CoreError::InvalidInput(
            "u256 halves must each be below 2^128".into(),
        ));
    }
    Ok((high << 128) + low)
}

/// Parse a human decimal amount into base units for a token with `decimals`
/// fractional digits.
///
/// Rejects empty input, a bare `.`, scientific notation, signs, and more
/// fractional digits than the token carries.
pub fn parse_units(text: &str, decimals: u32) -> Result<BigUint, CoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Err(CoreError::InvalidInput(format!(
            "amount must be a decimal number, got {text:?}"
        )));
    }
    if trimmed.bytes().any(|b| !b.is_ascii_digit() && b != b'.') {
        return Err(CoreError::InvalidInput(format!(
            "amount must contain only digits and at most one '.', got {text:?}"
        )));
    }
    let mut parts = trimmed.splitn(3, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return Err(CoreError::InvalidInput(format!(
            "amount has more than one '.': {text:?}"
        )));
    }
    if frac_part.len() as u32 > decimals {
        return Err(CoreError::InvalidInput(format!(
            "amount has {} fractional digits but the token only has {decimals}",
            frac_part.len()
        )));
    }

    let int_value = if int_part.is_empty() {
        BigUint::zero()
    } else {
        BigUint::from_str_radix(int_part, 10)
            .map_err(|e| CoreError::InvalidInput(format!("bad integer part {int_part:?}: {e}")))?
    };
    let frac_value = if frac_part.is_empty() {
        BigUint::zero()
    } else {
        BigUint::from_str_radix(frac_part, 10)
            .map_err(|e| CoreError::InvalidInput(format!("bad fraction {frac_part:?}: {e}")))?
    };

    let scale = BigUint::from(10u8).pow(decimals);
    let frac_scale = BigUint::from(10u8).pow(decimals - frac_part.len() as u32);
    Ok(int_value * scale + frac_value * frac_scale)
}

/// Render base units back as a decimal string (inverse of `parse_units`).
/// Trailing fractional zeros are trimmed; whole values carry no point.
pub fn format_units(v: &BigUint, decimals: u32) -> String {
    let scale = BigUint::from(10u8).pow(decimals);
    let int_part = v / &scale;
    let frac_part = v % &scale;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{:0width$}", frac_part, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{int_part}.{frac}")
}

/// Decimal-string round trip used by persisted amounts.
pub fn biguint_from_decimal(s: &str) -> Result<BigUint, CoreError> {
    BigUint::from_str_radix(s.trim(), 10)
        .map_err(|e| CoreError::InvalidInput(format!("not a decimal integer {s:?}: {e}")))
}

pub fn biguint_to_felt(v: &BigUint) -> Result<Felt, CoreError> {
    Felt::from_hex(&format!("0x{}", v.to_str_radix(16)))
        .map_err(|e| CoreError::InvalidInput(format!("value does not fit in a felt: {e}")))
}

pub fn felt_to_biguint(f: &Felt) -> BigUint {
    BigUint::from_bytes_be(&f.to_bytes_be())
}
