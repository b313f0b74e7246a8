//! The JSON-RPC transport seam.
//!
//! Every node call the toolkit performs goes through [`ChainClient`].
//! [`RpcChainClient`] is the production implementation over alloy providers;
//! tests substitute the in-memory chain from [`crate::testing`].

use std::fmt;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy::sol_types::decode_revert_reason;
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use chzkit_core::{AgentError, Result};
use futures::stream::{self, BoxStream, StreamExt};

use crate::types::{BlockSummary, ChainLog, LogQuery, Receipt};

/// Node operations used by the toolkit.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    /// Next nonce for `address`, counting pending transactions.
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    /// Legacy gas price in wei.
    async fn gas_price(&self) -> Result<u128>;

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64>;

    /// `eth_call` against the latest block.
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes>;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn block(&self, number: BlockNumberOrTag) -> Result<Option<BlockSummary>>;

    /// `None` while the transaction is unknown or not yet mined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>>;

    async fn code(&self, address: Address, block: BlockId) -> Result<Bytes>;

    async fn storage_at(&self, address: Address, slot: U256, block: BlockId) -> Result<B256>;

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>>;

    /// Broadcasts an EIP-2718 encoded signed transaction and returns its hash.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    /// Live stream of logs matching `query`. The stream ends when the
    /// underlying subscription is lost.
    async fn subscribe_logs(&self, query: LogQuery) -> Result<BoxStream<'static, ChainLog>>;
}

/// Maps an alloy RPC failure onto the toolkit's error taxonomy.
///
/// Error payloads returned by the node become `Transaction` errors carrying
/// the decoded revert reason when there is one. Everything else is a
/// transport problem and becomes `Network`.
pub fn classify_rpc_error(context: &str, err: RpcError<TransportErrorKind>) -> AgentError {
    match err.as_error_resp() {
        Some(payload) => {
            let message = payload.message.to_string();
            let reason = payload
                .as_revert_data()
                .and_then(|data| decode_revert_reason(&data))
                .or_else(|| revert_reason_from_message(&message));
            let err = AgentError::transaction(format!("{context}: {message}"));
            match reason {
                Some(reason) => err.with_reason(reason),
                None => err,
            }
        }
        None => AgentError::Network(format!("{context}: {err}")),
    }
}

fn revert_reason_from_message(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    if !lower.contains("revert") {
        return None;
    }
    let reason = message
        .split_once("reverted:")
        .map(|(_, r)| r.trim())
        .unwrap_or(message)
        .to_string();
    Some(reason)
}

/// [`ChainClient`] over an HTTP provider and an optional WebSocket provider.
#[derive(Clone)]
pub struct RpcChainClient {
    provider: DynProvider<Ethereum>,
    ws: Option<DynProvider<Ethereum>>,
    rpc_url: String,
    poll_interval: Duration,
}

impl fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.rpc_url)
            .field("ws", &self.ws.is_some())
            .finish()
    }
}

impl RpcChainClient {
    /// HTTP-only client. Live log subscriptions fall back to filter polling.
    pub fn http(rpc_url: &str) -> Result<Self> {
        let url: alloy::transports::http::reqwest::Url = rpc_url
            .parse()
            .map_err(|e| AgentError::Configuration(format!("invalid RPC URL '{rpc_url}': {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            ws: None,
            rpc_url: rpc_url.to_string(),
            poll_interval: Duration::from_secs(1),
        })
    }

    /// HTTP client plus, when `ws_url` is given, a WebSocket connection used
    /// for `eth_subscribe`.
    pub async fn connect(rpc_url: &str, ws_url: Option<&str>) -> Result<Self> {
        let mut client = Self::http(rpc_url)?;
        if let Some(ws_url) = ws_url {
            let ws = ProviderBuilder::new()
                .connect_ws(WsConnect::new(ws_url))
                .await
                .map_err(|e| AgentError::Network(format!("websocket connect to {ws_url}: {e}")))?;
            client.ws = Some(ws.erased());
        }
        Ok(client)
    }

    /// Wraps an existing provider.
    pub fn from_provider(provider: DynProvider<Ethereum>) -> Self {
        Self {
            provider,
            ws: None,
            rpc_url: String::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Interval for HTTP filter polling when no WebSocket is configured.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn provider(&self) -> &DynProvider<Ethereum> {
        &self.provider
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| classify_rpc_error("eth_chainId", e))
    }

    async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| classify_rpc_error("eth_blockNumber", e))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| classify_rpc_error("eth_getTransactionCount", e))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| classify_rpc_error("eth_gasPrice", e))
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64> {
        self.provider
            .estimate_gas(tx)
            .await
            .map_err(|e| classify_rpc_error("eth_estimateGas", e))
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
        self.provider
            .call(tx)
            .await
            .map_err(|e| classify_rpc_error("eth_call", e))
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| classify_rpc_error("eth_getBalance", e))
    }

    async fn block(&self, number: BlockNumberOrTag) -> Result<Option<BlockSummary>> {
        let block = self
            .provider
            .get_block_by_number(number)
            .await
            .map_err(|e| classify_rpc_error("eth_getBlockByNumber", e))?;
        Ok(block.map(BlockSummary::from))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| classify_rpc_error("eth_getTransactionReceipt", e))?;
        Ok(receipt.map(Receipt::from))
    }

    async fn code(&self, address: Address, block: BlockId) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .block_id(block)
            .await
            .map_err(|e| classify_rpc_error("eth_getCode", e))
    }

    async fn storage_at(&self, address: Address, slot: U256, block: BlockId) -> Result<B256> {
        let value = self
            .provider
            .get_storage_at(address, slot)
            .block_id(block)
            .await
            .map_err(|e| classify_rpc_error("eth_getStorageAt", e))?;
        Ok(B256::from(value))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        let logs = self
            .provider
            .get_logs(&query.to_filter())
            .await
            .map_err(|e| classify_rpc_error("eth_getLogs", e))?;
        Ok(logs.iter().map(ChainLog::from).collect())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| classify_rpc_error("eth_sendRawTransaction", e))?;
        Ok(*pending.tx_hash())
    }

    async fn subscribe_logs(&self, query: LogQuery) -> Result<BoxStream<'static, ChainLog>> {
        let filter = query.to_filter();
        match &self.ws {
            Some(ws) => {
                let sub = ws
                    .subscribe_logs(&filter)
                    .await
                    .map_err(|e| classify_rpc_error("eth_subscribe", e))?;
                Ok(sub.into_stream().map(ChainLog::from).boxed())
            }
            None => {
                let poller = self
                    .provider
                    .watch_logs(&filter)
                    .await
                    .map_err(|e| classify_rpc_error("eth_newFilter", e))?;
                Ok(poller
                    .with_poll_interval(self.poll_interval)
                    .into_stream()
                    .flat_map(stream::iter)
                    .map(ChainLog::from)
                    .boxed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::transports::mock::Asserter;

    fn mocked() -> (RpcChainClient, Asserter) {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        (RpcChainClient::from_provider(provider), asserter)
    }

    #[test]
    fn rejects_malformed_url() {
        let err = RpcChainClient::http("not a url").unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }

    #[tokio::test]
    async fn reads_chain_id_through_provider() {
        let (client, asserter) = mocked();
        asserter.push_success(&alloy::primitives::U64::from(88888u64));
        assert_eq!(client.chain_id().await.unwrap(), 88888);
    }

    #[tokio::test]
    async fn node_error_becomes_transaction_error() {
        let (client, asserter) = mocked();
        asserter.push_failure_msg("execution reverted: ERC20: transfer amount exceeds balance");
        let err = client
            .estimate_gas(TransactionRequest::default())
            .await
            .unwrap_err();
        assert_eq!(
            err.revert_reason(),
            Some("ERC20: transfer amount exceeds balance")
        );
    }

    #[tokio::test]
    async fn missing_receipt_is_none() {
        let (client, asserter) = mocked();
        asserter.push_success(&serde_json::Value::Null);
        let receipt = client.transaction_receipt(B256::ZERO).await.unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn revert_reason_parsing() {
        assert_eq!(
            revert_reason_from_message("execution reverted: not owner").as_deref(),
            Some("not owner")
        );
        assert_eq!(
            revert_reason_from_message("execution reverted").as_deref(),
            Some("execution reverted")
        );
        assert_eq!(revert_reason_from_message("nonce too low"), None);
    }
}
