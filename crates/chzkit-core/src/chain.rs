//! Known networks and their metadata.
//!
//! The connection layer compares the chain id reported by the node with the
//! configured network's id; a mismatch is only a warning.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Networks with built-in metadata.
///
/// Each variant carries its well-known numeric chain ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum Network {
    /// Chiliz Chain mainnet
    Mainnet = 88888,
    /// Chiliz Spicy testnet
    Testnet = 88882,
}

impl Network {
    /// All known networks.
    pub const ALL: [Network; 2] = [Self::Mainnet, Self::Testnet];

    /// Returns the numeric chain ID.
    pub const fn chain_id(self) -> u64 {
        self as u64
    }

    /// Human-readable network name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mainnet => "Chiliz Chain",
            Self::Testnet => "Chiliz Chain Testnet",
        }
    }

    /// Public JSON-RPC endpoint.
    pub const fn default_rpc_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://rpc.chiliz.com",
            Self::Testnet => "https://spicy-rpc.chiliz.com",
        }
    }

    /// Block explorer base URL.
    pub const fn explorer_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://scan.chiliz.com",
            Self::Testnet => "https://testnet.chiliscan.com",
        }
    }

    /// Symbol of the native currency.
    pub const fn native_symbol(self) -> &'static str {
        "CHZ"
    }

    pub const fn is_testnet(self) -> bool {
        matches!(self, Self::Testnet)
    }

    /// Explorer link for a transaction hash (`0x`-prefixed hex).
    pub fn explorer_tx_url(self, tx_hash: &str) -> String {
        format!("{}/tx/{tx_hash}", self.explorer_url())
    }

    /// Looks up a known network by chain id.
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::try_from(chain_id).ok()
    }
}

impl TryFrom<u64> for Network {
    type Error = UnknownNetworkError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            88888 => Ok(Self::Mainnet),
            88882 => Ok(Self::Testnet),
            _ => Err(UnknownNetworkError(value.to_string())),
        }
    }
}

impl From<Network> for u64 {
    fn from(network: Network) -> u64 {
        network.chain_id()
    }
}

impl FromStr for Network {
    type Err = UnknownNetworkError;

    /// Accepts `mainnet`, `testnet`, `spicy` or a numeric chain id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "spicy" => Ok(Self::Testnet),
            other => other
                .parse::<u64>()
                .ok()
                .and_then(Self::from_chain_id)
                .ok_or_else(|| UnknownNetworkError(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.chain_id())
    }
}

/// Error when a chain id or name does not match a known network.
#[derive(Debug, Clone)]
pub struct UnknownNetworkError(pub String);

impl fmt::Display for UnknownNetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown network '{}'; known networks: {}",
            self.0,
            Network::ALL
                .iter()
                .map(|n| format!("{} ({})", n.chain_id(), n.name()))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl std::error::Error for UnknownNetworkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_networks() {
        for network in Network::ALL {
            let back = Network::try_from(network.chain_id()).unwrap();
            assert_eq!(network, back);
        }
    }

    #[test]
    fn unknown_chain_rejected() {
        assert!(Network::try_from(1u64).is_err());
        assert!(Network::try_from(0u64).is_err());
        assert!(Network::from_chain_id(31337).is_none());
    }

    #[test]
    fn parse_names_and_ids() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("Spicy".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("88882".parse::<Network>().unwrap(), Network::Testnet);
        assert!("goerli".parse::<Network>().is_err());
    }

    #[test]
    fn display_includes_name_and_id() {
        let s = Network::Mainnet.to_string();
        assert!(s.contains("Chiliz Chain"));
        assert!(s.contains("88888"));
    }

    #[test]
    fn explorer_link() {
        assert_eq!(
            Network::Testnet.explorer_tx_url("0xabc"),
            "https://testnet.chiliscan.com/tx/0xabc"
        );
    }

    #[test]
    fn error_message_lists_known() {
        let msg = UnknownNetworkError("999".into()).to_string();
        assert!(msg.contains("999"));
        assert!(msg.contains("88888"));
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&Network::Testnet).unwrap();
        assert_eq!(json, "88882");
        let back: Network = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Network::Testnet);
        assert!(serde_json::from_str::<Network>("1").is_err());
    }
}
