//! Read-only chain queries.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy::sol_types::SolCall;
use chzkit_core::{AgentError, Result};

use crate::abi::IERC20;
use crate::connection::ConnectionManager;
use crate::types::{BlockSummary, ChainLog, LogQuery, Receipt};

/// Request/response reads against the shared connection.
#[derive(Debug, Clone)]
pub struct ChainReader {
    conn: Arc<ConnectionManager>,
}

/// Guarantees a non-empty revert reason on failed estimates.
pub(crate) fn ensure_reason(err: AgentError) -> AgentError {
    let fallback = match &err {
        AgentError::Transaction { message, reason, .. }
            if reason.as_deref().is_none_or(str::is_empty) =>
        {
            Some(message.clone())
        }
        _ => None,
    };
    match fallback {
        Some(message) => err.with_reason(message),
        None => err,
    }
}

impl ChainReader {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self { conn }
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        self.conn.with_client(|c| async move { c.chain_id().await }).await
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.conn.with_client(|c| async move { c.block_number().await }).await
    }

    /// Legacy gas price in wei.
    pub async fn gas_price(&self) -> Result<u128> {
        self.conn.with_client(|c| async move { c.gas_price().await }).await
    }

    /// Forwards `tx` unmodified. A revert is a `Transaction` error with a
    /// non-empty reason.
    pub async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64> {
        self.conn
            .with_client(|c| async move { c.estimate_gas(tx).await })
            .await
            .map_err(ensure_reason)
    }

    pub async fn latest_block(&self) -> Result<BlockSummary> {
        self.block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| AgentError::Network("node returned no latest block".into()))
    }

    /// `None` when the block does not exist yet.
    pub async fn block_by_number(&self, number: impl Into<BlockNumberOrTag>) -> Result<Option<BlockSummary>> {
        let number = number.into();
        self.conn.with_client(|c| async move { c.block(number).await }).await
    }

    /// `None` when the hash is unknown or not yet mined.
    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.conn
            .with_client(|c| async move { c.transaction_receipt(hash).await })
            .await
    }

    /// Deployed bytecode at the latest block; empty for externally owned accounts.
    pub async fn code(&self, address: Address) -> Result<Bytes> {
        self.conn
            .with_client(|c| async move { c.code(address, BlockId::latest()).await })
            .await
    }

    pub async fn storage_at(&self, address: Address, slot: U256, block: BlockId) -> Result<B256> {
        self.conn
            .with_client(|c| async move { c.storage_at(address, slot, block).await })
            .await
    }

    /// Native balance in wei.
    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.conn.with_client(|c| async move { c.balance(address).await }).await
    }

    pub async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        self.conn.with_client(|c| async move { c.logs(query).await }).await
    }

    async fn erc20_call<C: SolCall>(&self, token: Address, call: C) -> Result<C::Return> {
        let tx = TransactionRequest::default()
            .to(token)
            .input(Bytes::from(call.abi_encode()).into());
        let data = self.conn.with_client(|c| async move { c.call(tx).await }).await?;
        C::abi_decode_returns(&data).map_err(|e| {
            AgentError::transaction(format!("unexpected response from token {token}: {e}"))
        })
    }

    /// ERC-20 `balanceOf(owner)` in the token's smallest unit.
    pub async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.erc20_call(token, IERC20::balanceOfCall { owner }).await
    }

    /// ERC-20 `decimals()`.
    pub async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.erc20_call(token, IERC20::decimalsCall {}).await
    }

    pub async fn token_symbol(&self, token: Address) -> Result<String> {
        self.erc20_call(token, IERC20::symbolCall {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::testing::{FakeChain, FakeConnector};
    use chzkit_signer::Identity;

    const SECRET: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn reader() -> (ChainReader, Arc<FakeChain>) {
        let chain = Arc::new(FakeChain::new(88882));
        let conn = ConnectionManager::new(
            ConnectionSettings::new("http://fake", 88882),
            Identity::from_secret(SECRET).unwrap(),
            Arc::new(FakeConnector::new(chain.clone())),
        );
        (ChainReader::new(Arc::new(conn)), chain)
    }

    #[tokio::test]
    async fn basic_reads() {
        let (reader, chain) = reader();
        let who = Address::repeat_byte(0x42);
        chain.fund(who, U256::from(7u64));
        chain.set_gas_price(123);

        assert_eq!(reader.chain_id().await.unwrap(), 88882);
        assert_eq!(reader.gas_price().await.unwrap(), 123);
        assert_eq!(reader.balance(who).await.unwrap(), U256::from(7u64));
        assert!(reader.code(who).await.unwrap().is_empty());

        let latest = reader.latest_block().await.unwrap();
        assert_eq!(latest.number, chain.head());
        assert!(reader.block_by_number(latest.number + 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_receipt_is_none() {
        let (reader, _) = reader();
        assert!(reader
            .transaction_receipt(B256::repeat_byte(0x99))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn storage_and_code() {
        let (reader, chain) = reader();
        let contract = Address::repeat_byte(0x05);
        chain.set_code(contract, Bytes::from_static(&[0x60, 0x01]));
        chain.set_storage(contract, U256::from(1u64), B256::repeat_byte(0xee));

        assert_eq!(reader.code(contract).await.unwrap().len(), 2);
        let value = reader
            .storage_at(contract, U256::from(1u64), BlockId::latest())
            .await
            .unwrap();
        assert_eq!(value, B256::repeat_byte(0xee));
    }

    #[tokio::test]
    async fn token_reads() {
        let (reader, chain) = reader();
        let token = Address::repeat_byte(0x77);
        let owner = Address::repeat_byte(0x01);
        chain.deploy_token(token, "PSG", Some(0));
        chain.mint(token, owner, U256::from(25u64));

        assert_eq!(reader.token_balance(token, owner).await.unwrap(), U256::from(25u64));
        assert_eq!(reader.token_decimals(token).await.unwrap(), 0);
        assert_eq!(reader.token_symbol(token).await.unwrap(), "PSG");
    }

    #[tokio::test]
    async fn estimate_revert_carries_reason() {
        let (reader, chain) = reader();
        chain.set_estimate_revert(Some("ERC20: transfer amount exceeds balance"));
        let err = reader.estimate_gas(TransactionRequest::default()).await.unwrap_err();
        assert!(!err.revert_reason().unwrap_or_default().is_empty());
        assert_eq!(chain.broadcast_count(), 0);
    }

    #[test]
    fn ensure_reason_fills_from_message() {
        let err = ensure_reason(AgentError::transaction("execution reverted"));
        assert_eq!(err.revert_reason(), Some("execution reverted"));
        let net = ensure_reason(AgentError::Network("down".into()));
        assert!(net.revert_reason().is_none());
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_network() {
        let (reader, chain) = reader();
        reader.chain_id().await.unwrap();
        chain.set_unreachable(true);
        assert!(matches!(reader.gas_price().await, Err(AgentError::Network(_))));
    }
}
