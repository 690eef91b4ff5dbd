//! Static USD valuation for policy caps.
//!
//! Caps are expressed in integer cents and amounts in base units; the
//! conversion never touches floating point. The rate table is intentionally
//! coarse — caps are a safety rail, not an accounting system — and USDC is
//! pinned at face value.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use starkclaw_core::{Token, TokenSymbol};

/// Approximate cents per whole token.
fn cents_per_token(symbol: TokenSymbol) -> u64 {
    match symbol {
        TokenSymbol::Eth => 250_000,
        TokenSymbol::Strk => 50,
        TokenSymbol::Usdc => 100,
    }
}

/// Value of `amount_base_units` of `token` in USD cents, rounded down.
/// Saturates at `u64::MAX` cents — far beyond any configurable cap.
pub fn usd_cents_for_amount(token: &Token, amount_base_units: &BigUint) -> u64 {
    let scale = BigUint::from(10u8).pow(token.decimals);
    let cents = amount_base_units * cents_per_token(token.symbol) / scale;
    cents.to_u64().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use starkclaw_core::token::token_by_symbol;

    #[test]
    fn usdc_is_face_value() {
        let usdc = token_by_symbol(TokenSymbol::Usdc);
        // 1 USDC = 1_000_000 base units = 100 cents.
        assert_eq!(usd_cents_for_amount(usdc, &BigUint::from(1_000_000u64)), 100);
        assert_eq!(usd_cents_for_amount(usdc, &BigUint::from(15_000_000u64)), 1_500);
    }

    #[test]
    fn sub_cent_amounts_round_down_to_zero() {
        let usdc = token_by_symbol(TokenSymbol::Usdc);
        assert_eq!(usd_cents_for_amount(usdc, &BigUint::from(9_999u64)), 0);
    }

    #[test]
    fn eth_uses_eighteen_decimals() {
        let eth = token_by_symbol(TokenSymbol::Eth);
        let one_eth = BigUint::from(10u8).pow(18);
        assert_eq!(usd_cents_for_amount(eth, &one_eth), 250_000);
    }
}
