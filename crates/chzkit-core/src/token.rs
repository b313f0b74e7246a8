//! Token descriptors and the ticker → token map used by the tool layer.

use std::collections::BTreeMap;
use std::path::Path;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::error::{AgentError, Result};

/// A token contract known to the caller.
///
/// `decimals` is optional: when absent the executor queries the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub address: Address,
    pub decimals: Option<u8>,
}

impl TokenDescriptor {
    pub fn new(address: Address, decimals: Option<u8>) -> Self {
        Self { address, decimals }
    }
}

#[derive(Debug, Deserialize)]
struct RawToken {
    address: String,
    #[serde(default)]
    decimals: Option<u8>,
}

/// Ticker → token mapping. Tickers are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    tokens: BTreeMap<String, TokenDescriptor>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML mapping of `TICKER: { address, decimals? }`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawToken> = serde_yaml::from_str(yaml)
            .map_err(|e| AgentError::Configuration(format!("invalid token map: {e}")))?;

        let mut map = Self::new();
        for (ticker, token) in raw {
            let address: Address = token.address.parse().map_err(|_| {
                AgentError::Configuration(format!(
                    "invalid address '{}' for token {ticker}",
                    token.address
                ))
            })?;
            map.insert(&ticker, TokenDescriptor::new(address, token.decimals));
        }
        Ok(map)
    }

    /// Load a token map from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!(
                "failed to read token map {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml(&contents)
    }

    /// Insert or replace a token under `ticker`.
    pub fn insert(&mut self, ticker: &str, token: TokenDescriptor) {
        self.tokens.insert(ticker.trim().to_ascii_uppercase(), token);
    }

    /// Builder-style [`TokenMap::insert`].
    pub fn with_token(mut self, ticker: &str, token: TokenDescriptor) -> Self {
        self.insert(ticker, token);
        self
    }

    pub fn get(&self, ticker: &str) -> Option<&TokenDescriptor> {
        self.tokens.get(&ticker.trim().to_ascii_uppercase())
    }

    /// Known tickers, upper-case and sorted.
    pub fn tickers(&self) -> Vec<&str> {
        self.tokens.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
