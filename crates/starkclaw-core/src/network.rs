use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of networks the wallet operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    Sepolia,
    Mainnet,
}

impl NetworkId {
    /// Default public JSON-RPC endpoint for this network.
    pub fn rpc_url(&self) -> &'static str {
        match self {
            NetworkId::Sepolia => "https://starknet-sepolia.public.blastapi.io/rpc/v0_8",
            NetworkId::Mainnet => "https://starknet-mainnet.public.blastapi.io/rpc/v0_8",
        }
    }

    /// Chain id as the hex encoding of the short string ("SN_SEPOLIA" / "SN_MAIN").
    pub fn chain_id_hex(&self) -> &'static str {
        match self {
            NetworkId::Sepolia => "0x534e5f5345504f4c4941",
            NetworkId::Mainnet => "0x534e5f4d41494e",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Sepolia => write!(f, "sepolia"),
            NetworkId::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl std::str::FromStr for NetworkId {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sepolia" => Ok(NetworkId::Sepolia),
            "mainnet" => Ok(NetworkId::Mainnet),
            other => Err(crate::error::CoreError::InvalidInput(format!(
                "unknown network {other:?} (expected sepolia or mainnet)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_are_short_string_encodings() {
        // "SN_SEPOLIA" and "SN_MAIN" as big-endian ASCII.
        assert_eq!(NetworkId::Sepolia.chain_id_hex(), "0x534e5f5345504f4c4941");
        assert_eq!(NetworkId::Mainnet.chain_id_hex(), "0x534e5f4d41494e");
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Sepolia".parse::<NetworkId>().unwrap(), NetworkId::Sepolia);
        assert!("goerli".parse::<NetworkId>().is_err());
    }
}
