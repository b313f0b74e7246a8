//! Named text-in/text-out tools over an [`Agent`].
//!
//! Each tool takes a free-text input and always answers with text: malformed
//! input and unknown tickers produce an explanation, chain failures produce
//! `Error: …`. This keeps an LLM tool-calling adapter a pure mapping layer.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::Agent;

/// Tool discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    GetWalletAddress,
    GetNativeBalance,
    GetTokenBalance,
    SendNativeChz,
    SendFanToken,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        Self::GetWalletAddress,
        Self::GetNativeBalance,
        Self::GetTokenBalance,
        Self::SendNativeChz,
        Self::SendFanToken,
    ];

    /// Parse a tool name as exposed to callers.
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.trim() {
            "getWalletAddress" => Some(Self::GetWalletAddress),
            "getNativeBalance" => Some(Self::GetNativeBalance),
            "getTokenBalance" => Some(Self::GetTokenBalance),
            "sendNativeCHZ" => Some(Self::SendNativeChz),
            "sendFanToken" => Some(Self::SendFanToken),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetWalletAddress => "getWalletAddress",
            Self::GetNativeBalance => "getNativeBalance",
            Self::GetTokenBalance => "getTokenBalance",
            Self::SendNativeChz => "sendNativeCHZ",
            Self::SendFanToken => "sendFanToken",
        }
    }
}

/// Name and description handed to a tool-calling model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: String,
}

/// The agent's tools, with descriptions listing the known tickers.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    agent: Arc<Agent>,
    specs: Vec<ToolSpec>,
}

fn split_fields(input: &str, expected: usize) -> Option<Vec<&str>> {
    let fields: Vec<&str> = input.split(',').map(str::trim).collect();
    (fields.len() == expected && fields.iter().all(|f| !f.is_empty())).then_some(fields)
}

impl ToolRegistry {
    pub fn new(agent: Arc<Agent>) -> Self {
        let tickers = agent.tokens().tickers().join(", ");
        let specs = ToolName::ALL
            .iter()
            .map(|tool| ToolSpec {
                name: tool.as_str(),
                description: describe(*tool, &tickers),
            })
            .collect();
        Self { agent, specs }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    /// Tool specs as a JSON array of `{name, description}`.
    pub fn specs_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.specs).unwrap_or_default()
    }

    fn available_tickers(&self) -> String {
        self.agent.tokens().tickers().join(", ")
    }

    fn unknown_ticker(&self, ticker: &str) -> String {
        format!(
            "Unknown token ticker: {ticker}. Available tickers are: {}",
            self.available_tickers()
        )
    }

    /// Runs the tool called `name` on `input`.
    pub async fn invoke(&self, name: &str, input: &str) -> String {
        let Some(tool) = ToolName::parse_name(name) else {
            warn!(tool = name, "unknown tool");
            let names: Vec<&str> = ToolName::ALL.iter().map(ToolName::as_str).collect();
            return format!("Unknown tool: {name}. Available tools are: {}", names.join(", "));
        };
        info!(tool = tool.as_str(), "invoking tool");
        self.run(tool, input.trim()).await
    }

    async fn run(&self, tool: ToolName, input: &str) -> String {
        match tool {
            ToolName::GetWalletAddress => self.agent.get_wallet_address(),
            ToolName::GetNativeBalance => match self.agent.get_native_balance().await {
                Ok(balance) => balance,
                Err(e) => format!("Error: {e}"),
            },
            ToolName::GetTokenBalance => {
                let ticker = input.to_ascii_uppercase();
                if self.agent.tokens().get(&ticker).is_none() {
                    return self.unknown_ticker(input);
                }
                match self.agent.get_token_balance(&ticker).await {
                    Ok(balance) => format!("{balance} {ticker}"),
                    Err(e) => format!("Error: {e}"),
                }
            }
            ToolName::SendNativeChz => {
                let Some(fields) = split_fields(input, 2) else {
                    return "Invalid input. Expected format: \"recipientAddress,amount\"".into();
                };
                match self.agent.send_native_chz(fields[0], fields[1]).await {
                    Ok(hash) => format!("Transaction sent successfully. Hash: {hash}"),
                    Err(e) => format!("Error: {e}"),
                }
            }
            ToolName::SendFanToken => {
                let Some(fields) = split_fields(input, 3) else {
                    return "Invalid input. Expected format: \"ticker,recipientAddress,amount\"".into();
                };
                if self.agent.tokens().get(fields[0]).is_none() {
                    return self.unknown_ticker(fields[0]);
                }
                match self.agent.send_fan_token(fields[0], fields[1], fields[2]).await {
                    Ok(hash) => format!("Transaction sent successfully. Hash: {hash}"),
                    Err(e) => format!("Error: {e}"),
                }
            }
        }
    }
}

fn describe(tool: ToolName, tickers: &str) -> String {
    match tool {
        ToolName::GetWalletAddress => {
            "Returns the agent's wallet address. Input should be an empty string.".into()
        }
        ToolName::GetNativeBalance => {
            "Returns the agent's native CHZ balance. Input should be an empty string.".into()
        }
        ToolName::GetTokenBalance => format!(
            "Returns the balance of a specific fan token. Input must be a token ticker. \
             Available tickers: {tickers}"
        ),
        ToolName::SendNativeChz => "Sends native CHZ to a recipient. Input must be a \
             comma-separated string of \"recipientAddress,amount\". For example: \"0x123...,1.5\""
            .into(),
        ToolName::SendFanToken => format!(
            "Sends a fan token to a recipient. Input must be a comma-separated string of \
             \"ticker,recipientAddress,amount\". For example: \"PSG,0x123...,10\". \
             Available tickers: {tickers}"
        ),
    }
}
