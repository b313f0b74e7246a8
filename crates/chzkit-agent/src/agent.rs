//! The agent facade.
//!
//! [`Agent`] owns one [`ConnectionManager`] and builds every component
//! against it, so all of them share a single connection and identity.

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::TransactionRequest;
use chzkit_core::units::{format_ether, format_units};
use chzkit_core::{AgentConfig, AgentError, Result, TokenDescriptor, TokenMap};
use chzkit_evm::{
    ChainReader, ConnectionManager, Connector, EventSubscriptionRegistry, ExecutorSettings,
    RpcConnector, TransactionExecutor,
};
use chzkit_signer::{parse_signature, signature_hex, Identity};
use tracing::info;

/// Entry point for programmatic callers and the tool layer.
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    tokens: TokenMap,
    conn: Arc<ConnectionManager>,
    reader: ChainReader,
    executor: TransactionExecutor,
    events: EventSubscriptionRegistry,
}

impl Agent {
    /// Validates `config`, loads the token map and connects over JSON-RPC.
    ///
    /// Missing or malformed settings are `Configuration` errors; an
    /// unreachable endpoint is a `Network` error.
    pub async fn create(config: AgentConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(RpcConnector)).await
    }

    /// Like [`Agent::create`] with a caller-supplied transport.
    pub async fn with_connector(config: AgentConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        let tokens = match &config.token_map_path {
            Some(path) => TokenMap::from_file(path)?,
            None => TokenMap::new(),
        };

        let conn = Arc::new(ConnectionManager::from_config(&config, connector)?);
        let connection = conn.connection().await?;

        let agent = Self {
            reader: ChainReader::new(conn.clone()),
            executor: TransactionExecutor::new(conn.clone(), ExecutorSettings::from(&config)),
            events: EventSubscriptionRegistry::new(conn.clone()),
            conn,
            tokens,
            config,
        };
        info!(
            chain_id = connection.chain_id(),
            address = %agent.address(),
            tokens = agent.tokens.len(),
            "agent initialized"
        );
        Ok(agent)
    }

    /// Replaces the ticker map used by the token operations.
    pub fn with_tokens(mut self, tokens: TokenMap) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenMap {
        &self.tokens
    }

    pub fn address(&self) -> Address {
        self.conn.address()
    }

    pub fn identity(&self) -> Arc<Identity> {
        self.conn.identity()
    }

    pub fn reader(&self) -> &ChainReader {
        &self.reader
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    pub fn events(&self) -> &EventSubscriptionRegistry {
        &self.events
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.conn
    }

    fn token(&self, ticker: &str) -> Result<TokenDescriptor> {
        self.tokens.get(ticker).copied().ok_or_else(|| {
            AgentError::Validation(format!(
                "unknown token ticker '{}'; available: {}",
                ticker.trim(),
                self.tokens.tickers().join(", ")
            ))
        })
    }

    // ---- tool operations ----

    /// Checksummed address of the held identity.
    pub fn get_wallet_address(&self) -> String {
        self.address().to_checksum(None)
    }

    /// Native balance of the held identity, in CHZ.
    pub async fn get_native_balance(&self) -> Result<String> {
        let wei = self.reader.balance(self.address()).await?;
        Ok(format_ether(wei))
    }

    /// Balance of the token registered under `ticker`, in token units.
    pub async fn get_token_balance(&self, ticker: &str) -> Result<String> {
        let token = self.token(ticker)?;
        let raw = self.reader.token_balance(token.address, self.address()).await?;
        let decimals = self.executor.resolve_decimals(token.address, token.decimals).await;
        Ok(format_units(raw, decimals))
    }

    /// Sends `amount` CHZ to `to` and waits for one confirmation.
    pub async fn send_native_chz(&self, to: &str, amount: &str) -> Result<B256> {
        self.executor.send_native(to, amount).await
    }

    /// Sends `amount` of the token registered under `ticker` to `to` and
    /// waits for one confirmation.
    pub async fn send_fan_token(&self, ticker: &str, to: &str, amount: &str) -> Result<B256> {
        let token = self.token(ticker)?;
        self.executor
            .send_token(token.address, to, amount, token.decimals)
            .await
    }

    // ---- chain introspection ----

    pub async fn get_chain_id(&self) -> Result<u64> {
        self.reader.chain_id().await
    }

    /// Legacy gas price in wei.
    pub async fn get_gas_price(&self) -> Result<u128> {
        self.reader.gas_price().await
    }

    pub async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64> {
        self.reader.estimate_gas(tx).await
    }

    /// EIP-191 signature of `message`, as `0x`-prefixed hex.
    pub fn sign_message(&self, message: &str) -> Result<String> {
        let signature = self.conn.identity().sign_message(message.as_bytes())?;
        Ok(signature_hex(&signature))
    }

    /// Recovers the signer of `message` from a hex `signature`.
    pub fn verify_message(&self, message: &str, signature: &str) -> Result<Address> {
        let signature = parse_signature(signature)?;
        Ok(Identity::verify_message(message.as_bytes(), &signature)?)
    }

    /// Cancels every subscription and releases the connection. Idempotent.
    ///
    /// Confirmation waits already in flight are not interrupted; their next
    /// poll fails with a `Network` error.
    pub async fn close(&self) {
        if self.conn.is_closed() {
            return;
        }
        self.events.unsubscribe_all();
        self.conn.close().await;
        info!("agent closed");
    }
}
