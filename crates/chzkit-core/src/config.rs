//! Environment-style configuration.
//!
//! Keys: `RPC_URL` (required), `PRIVATE_KEY` (required), `WS_URL`,
//! `TESTNET_RPC_URL`, `NETWORK`, `EXPECTED_CHAIN_ID`, `TOKEN_MAP_PATH`,
//! `STRICT_CHAIN_ID`, `TX_TIMEOUT_SECS`, `TX_POLL_INTERVAL_MS`, `LOG_LEVEL`,
//! `LOG_FORMAT`.
//! Endpoint keys also accept a `CHILIZ_` prefix.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use alloy::transports::http::reqwest::Url;
use tracing::debug;

use crate::chain::Network;
use crate::error::{AgentError, Result};
use crate::logging::{LogFormat, LogSettings};

/// Required keys, checked together so the error lists every missing one.
pub const REQUIRED_KEYS: [&str; 2] = ["RPC_URL", "PRIVATE_KEY"];

/// Default time to wait for a transaction to be mined.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Validated agent configuration.
#[derive(Clone)]
pub struct AgentConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Optional WebSocket endpoint for live events.
    pub ws_url: Option<String>,
    /// Alternate endpoint used when `network` is the testnet.
    pub testnet_rpc_url: Option<String>,
    /// `0x`-prefixed 32-byte hex secret.
    pub private_key: String,
    pub network: Network,
    /// Chain id the node is expected to report. Defaults to the network's id.
    pub expected_chain_id: u64,
    /// Treat a chain id mismatch as a `Network` error instead of a warning.
    pub strict_chain_id: bool,
    /// Optional YAML token map for the tool layer.
    pub token_map_path: Option<PathBuf>,
    /// Upper bound for confirmation waits.
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
    pub log: LogSettings,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("testnet_rpc_url", &self.testnet_rpc_url)
            .field("private_key", &"<redacted>")
            .field("network", &self.network)
            .field("expected_chain_id", &self.expected_chain_id)
            .field("strict_chain_id", &self.strict_chain_id)
            .field("token_map_path", &self.token_map_path)
            .field("tx_timeout", &self.tx_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("log", &self.log)
            .finish()
    }
}

impl AgentConfig {
    /// Minimal configuration; everything else takes its default.
    pub fn new(rpc_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            testnet_rpc_url: None,
            private_key: private_key.into(),
            network: Network::Mainnet,
            expected_chain_id: Network::Mainnet.chain_id(),
            strict_chain_id: false,
            token_map_path: None,
            tx_timeout: DEFAULT_TX_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log: LogSettings::default(),
        }
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup and validates it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .or_else(|| {
                    let legacy = format!("CHILIZ_{key}");
                    let value = lookup(&legacy);
                    if value.is_some() {
                        debug!(key = %legacy, "using legacy configuration key");
                    }
                    value
                })
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AgentError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let mut config = Self::new(
            get("RPC_URL").unwrap_or_default(),
            get("PRIVATE_KEY").unwrap_or_default(),
        );
        config.ws_url = get("WS_URL");
        config.testnet_rpc_url = get("TESTNET_RPC_URL");

        if let Some(network) = get("NETWORK") {
            config.network = network
                .parse()
                .map_err(|e| AgentError::Configuration(format!("NETWORK: {e}")))?;
        }
        config.expected_chain_id = match get("EXPECTED_CHAIN_ID") {
            Some(id) => parse_number("EXPECTED_CHAIN_ID", &id)?,
            None => config.network.chain_id(),
        };
        if let Some(strict) = get("STRICT_CHAIN_ID") {
            config.strict_chain_id = parse_bool("STRICT_CHAIN_ID", &strict)?;
        }
        config.token_map_path = get("TOKEN_MAP_PATH").map(PathBuf::from);
        if let Some(secs) = get("TX_TIMEOUT_SECS") {
            config.tx_timeout = Duration::from_secs(parse_number("TX_TIMEOUT_SECS", &secs)?);
        }
        if let Some(ms) = get("TX_POLL_INTERVAL_MS") {
            config.poll_interval =
                Duration::from_millis(parse_number("TX_POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(level) = get("LOG_LEVEL") {
            config.log.level = level;
        }
        if let Some(format) = get("LOG_FORMAT") {
            config.log.format = format
                .parse::<LogFormat>()
                .map_err(|e| AgentError::Configuration(format!("LOG_FORMAT: {e}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Switches to `network`, resetting the expected chain id to its default.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self.expected_chain_id = network.chain_id();
        self
    }

    /// The endpoint actually dialled: the testnet URL when the testnet is
    /// selected and one is configured, otherwise `rpc_url`.
    pub fn active_rpc_url(&self) -> &str {
        match (&self.testnet_rpc_url, self.network.is_testnet()) {
            (Some(url), true) => url,
            _ => &self.rpc_url,
        }
    }

    /// Checks key format, URL syntax and numeric bounds.
    pub fn validate(&self) -> Result<()> {
        validate_private_key(&self.private_key)?;
        validate_url("RPC_URL", &self.rpc_url, &["http", "https"])?;
        if let Some(url) = &self.testnet_rpc_url {
            validate_url("TESTNET_RPC_URL", url, &["http", "https"])?;
        }
        if let Some(url) = &self.ws_url {
            validate_url("WS_URL", url, &["ws", "wss"])?;
        }
        if self.expected_chain_id == 0 {
            return Err(AgentError::Configuration(
                "expected chain id must be greater than 0".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(AgentError::Configuration(
                "poll interval must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Checks the `^0x[0-9a-fA-F]{64}$` shape of a private key.
pub fn validate_private_key(key: &str) -> Result<()> {
    let valid = key.len() == 66
        && key.starts_with("0x")
        && key[2..].chars().all(|c| c.is_ascii_hexdigit());
    if valid {
        Ok(())
    } else {
        Err(AgentError::Configuration(
            "invalid private key format: must be a 32-byte hex string with 0x prefix".into(),
        ))
    }
}

fn validate_url(key: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let url: Url = value
        .parse()
        .map_err(|e| AgentError::Configuration(format!("{key}: invalid URL '{value}': {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(AgentError::Configuration(format!(
            "{key}: unsupported scheme '{}' (expected {})",
            url.scheme(),
            schemes.join(" or ")
        )));
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AgentError::Configuration(format!(
            "{key}: '{value}' is not a boolean"
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| AgentError::Configuration(format!("{key}: '{value}' is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn minimal_config() {
        let config =
            AgentConfig::from_lookup(lookup(&[("RPC_URL", "https://rpc.example"), ("PRIVATE_KEY", KEY)]))
                .unwrap();
        assert_eq!(config.rpc_url, "https://rpc.example");
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.expected_chain_id, 88888);
        assert_eq!(config.tx_timeout, DEFAULT_TX_TIMEOUT);
        assert!(config.ws_url.is_none());
    }

    #[test]
    fn missing_keys_listed_together() {
        let err = AgentConfig::from_lookup(lookup(&[])).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert!(msg.contains("RPC_URL"));
        assert!(msg.contains("PRIVATE_KEY"));
    }

    #[test]
    fn legacy_prefix_accepted() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("CHILIZ_RPC_URL", "https://rpc.chiliz.com"),
            ("CHILIZ_WS_URL", "wss://ws.chiliz.example"),
            ("PRIVATE_KEY", KEY),
        ]))
        .unwrap();
        assert_eq!(config.rpc_url, "https://rpc.chiliz.com");
        assert_eq!(config.ws_url.as_deref(), Some("wss://ws.chiliz.example"));
    }

    #[test]
    fn malformed_private_key_rejected() {
        for bad in [
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
            "0x1234",
            "0xZZ23456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
        ] {
            let err = AgentConfig::from_lookup(lookup(&[
                ("RPC_URL", "https://rpc.example"),
                ("PRIVATE_KEY", bad),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("private key"), "accepted {bad}");
        }
    }

    #[test]
    fn bad_urls_rejected() {
        let err = AgentConfig::from_lookup(lookup(&[("RPC_URL", "not a url"), ("PRIVATE_KEY", KEY)]))
            .unwrap_err();
        assert!(err.to_string().contains("RPC_URL"));

        let err = AgentConfig::from_lookup(lookup(&[
            ("RPC_URL", "https://rpc.example"),
            ("WS_URL", "https://not-a-socket.example"),
            ("PRIVATE_KEY", KEY),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("WS_URL"));
    }

    #[test]
    fn testnet_selection_uses_alternate_endpoint() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("RPC_URL", "https://rpc.example"),
            ("TESTNET_RPC_URL", "https://spicy.example"),
            ("NETWORK", "testnet"),
            ("PRIVATE_KEY", KEY),
        ]))
        .unwrap();
        assert_eq!(config.expected_chain_id, 88882);
        assert_eq!(config.active_rpc_url(), "https://spicy.example");

        let mainnet = config.with_network(Network::Mainnet);
        assert_eq!(mainnet.active_rpc_url(), "https://rpc.example");
        assert_eq!(mainnet.expected_chain_id, 88888);
    }

    #[test]
    fn numeric_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("RPC_URL", "http://127.0.0.1:8545"),
            ("PRIVATE_KEY", KEY),
            ("EXPECTED_CHAIN_ID", "31337"),
            ("TX_TIMEOUT_SECS", "5"),
            ("TX_POLL_INTERVAL_MS", "50"),
            ("LOG_FORMAT", "json"),
            ("LOG_LEVEL", "debug"),
            ("STRICT_CHAIN_ID", "true"),
        ]))
        .unwrap();
        assert!(config.strict_chain_id);
        assert_eq!(config.expected_chain_id, 31337);
        assert_eq!(config.tx_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "debug");

        let err = AgentConfig::from_lookup(lookup(&[
            ("RPC_URL", "http://127.0.0.1:8545"),
            ("PRIVATE_KEY", KEY),
            ("TX_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TX_TIMEOUT_SECS"));
    }

    #[test]
    fn debug_redacts_private_key() {
        let config = AgentConfig::new("https://rpc.example", KEY);
        let debug = format!("{config:?}");
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("<redacted>"));
    }
}
