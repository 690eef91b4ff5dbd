use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use std::fmt;

use crate::codec::felt_from_hex;
use crate::error::CoreError;
use crate::network::NetworkId;

/// Tokens the wallet knows how to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenSymbol {
    Eth,
    Strk,
    Usdc,
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSymbol::Eth => write!(f, "ETH"),
            TokenSymbol::Strk => write!(f, "STRK"),
            TokenSymbol::Usdc => write!(f, "USDC"),
        }
    }
}

impl std::str::FromStr for TokenSymbol {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ETH" => Ok(TokenSymbol::Eth),
            "STRK" => Ok(TokenSymbol::Strk),
            "USDC" => Ok(TokenSymbol::Usdc),
            other => Err(CoreError::InvalidInput(format!(
                "unsupported token {other:?} (expected ETH, STRK or USDC)"
            ))),
        }
    }
}

/// A token descriptor. Decimals are immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: TokenSymbol,
    pub name: &'static str,
    pub decimals: u32,
    sepolia_address: &'static str,
    mainnet_address: &'static str,
}

impl Token {
    /// ERC-20 contract address on the given network.
    pub fn address_on(&self, network: NetworkId) -> Felt {
        let hex = match network {
            NetworkId::Sepolia => self.sepolia_address,
            NetworkId::Mainnet => self.mainnet_address,
        };
        // Registry entries are compile-time constants, checked by tests.
        felt_from_hex(hex).unwrap_or(Felt::ZERO)
    }
}

static TOKENS: Lazy<Vec<Token>> = Lazy::new(|| {
    vec![
        Token {
            symbol: TokenSymbol::Eth,
            name: "Ether",
            decimals: 18,
            sepolia_address: "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
            mainnet_address: "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7",
        },
        Token {
            symbol: TokenSymbol::Strk,
            name: "Starknet Token",
            decimals: 18,
            sepolia_address: "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d",
            mainnet_address: "0x04718f5a0fc34cc1af16a1cdee98ffb20c31f5cd61d6ab07201858f4287c938d",
        },
        Token {
            symbol: TokenSymbol::Usdc,
            name: "USD Coin",
            decimals: 6,
            sepolia_address: "0x053b40a647cedfca6ca84f542a0fe36736031905a9639a7f19a3c1e66bfd5080",
            mainnet_address: "0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8",
        },
    ]
});

/// Look a token up by symbol. The list is closed; unknown symbols fail the
/// policy gate before this is ever reached.
pub fn token_by_symbol(symbol: TokenSymbol) -> &'static Token {
    TOKENS
        .iter()
        .find(|t| t.symbol == symbol)
        .unwrap_or(&TOKENS[0])
}

/// All known tokens.
pub fn all_tokens() -> &'static [Token] {
    &TOKENS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_addresses_parse() {
        for token in all_tokens() {
            assert_ne!(token.address_on(NetworkId::Sepolia), Felt::ZERO, "{}", token.symbol);
            assert_ne!(token.address_on(NetworkId::Mainnet), Felt::ZERO, "{}", token.symbol);
        }
    }

    #[test]
    fn usdc_has_six_decimals() {
        assert_eq!(token_by_symbol(TokenSymbol::Usdc).decimals, 6);
        assert_eq!(token_by_symbol(TokenSymbol::Eth).decimals, 18);
    }

    #[test]
    fn symbols_round_trip() {
        for t in all_tokens() {
            let parsed: TokenSymbol = t.symbol.to_string().parse().unwrap();
            assert_eq!(parsed, t.symbol);
        }
    }
}
