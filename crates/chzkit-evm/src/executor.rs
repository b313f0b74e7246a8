//! Transaction execution and confirmation tracking.
//!
//! Every write goes through [`TransactionExecutor::submit`]: the next nonce
//! is read from the node and the signed transaction is broadcast while the
//! identity's send lock is held, so concurrent sends never share a nonce.
//! Nothing is persisted; a transaction broadcast before a crash is simply
//! forgotten by this process.

use std::sync::Arc;
use std::time::Duration;

use alloy::dyn_abi::DynSolValue;
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use chzkit_core::units::{format_units, parse_ether, parse_units};
use chzkit_core::{AgentConfig, AgentError, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::abi::IERC20;
use crate::connection::ConnectionManager;
use crate::contract::{CallOptions, ContractHandle, MethodCall};
use crate::reader::{ensure_reason, ChainReader};
use crate::types::Receipt;

/// Gas limit of a plain native transfer.
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;

/// Decimals assumed when a token's `decimals()` cannot be read.
pub const FALLBACK_DECIMALS: u8 = 18;

/// Lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Built,
    Signed,
    Broadcast,
    Pending,
    Confirmed,
    Failed,
}

/// A transaction from assembly until its receipt is observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTransaction {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    /// Assigned once the node accepts the broadcast.
    pub hash: Option<B256>,
    state: TxState,
    receipt: Option<Receipt>,
}

impl PendingTransaction {
    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    fn advance(&mut self, next: TxState) {
        debug!(from = ?self.state, to = ?next, nonce = self.nonce, "transaction state");
        self.state = next;
    }
}

/// Timing knobs for confirmation waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Upper bound for [`TransactionExecutor::confirm`].
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            tx_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl From<&AgentConfig> for ExecutorSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            tx_timeout: config.tx_timeout,
            poll_interval: config.poll_interval,
        }
    }
}

/// Parses a `0x`-prefixed 20-byte address supplied by a caller.
pub fn parse_address(input: &str) -> Result<Address> {
    input
        .trim()
        .parse()
        .map_err(|_| AgentError::Validation(format!("invalid address '{}'", input.trim())))
}

fn non_zero(amount: U256, input: &str) -> Result<U256> {
    if amount.is_zero() {
        return Err(AgentError::Validation(format!(
            "invalid amount '{input}': must be greater than zero"
        )));
    }
    Ok(amount)
}

/// Builds, signs, broadcasts and confirms transactions for one identity.
#[derive(Debug, Clone)]
pub struct TransactionExecutor {
    conn: Arc<ConnectionManager>,
    reader: ChainReader,
    settings: ExecutorSettings,
}

impl TransactionExecutor {
    pub fn new(conn: Arc<ConnectionManager>, settings: ExecutorSettings) -> Self {
        let reader = ChainReader::new(conn.clone());
        Self {
            conn,
            reader,
            settings,
        }
    }

    pub fn settings(&self) -> ExecutorSettings {
        self.settings
    }

    /// Transfers `amount` (decimal CHZ) to `to` and waits for one confirmation.
    ///
    /// A returned hash means the transaction was mined successfully. A mined
    /// failure or a confirmation timeout is a `Transaction` error carrying
    /// the hash.
    pub async fn send_native(&self, to: &str, amount: &str) -> Result<B256> {
        let to = parse_address(to)?;
        let value = non_zero(parse_ether(amount)?, amount)?;

        let request = TransactionRequest::default()
            .with_to(to)
            .with_value(value)
            .with_gas_limit(NATIVE_TRANSFER_GAS);
        let mut pending = self.submit(request).await?;
        let receipt = self.confirm(&mut pending, 1).await?;
        info!(tx_hash = %receipt.transaction_hash, %to, amount, "native transfer confirmed");
        Ok(receipt.transaction_hash)
    }

    /// Transfers `amount` (decimal, in token units) of `token` to `to` and
    /// waits for one confirmation.
    ///
    /// `decimals` defaults to the token's own `decimals()`, or 18 when that
    /// call fails. The sender's balance is checked first; a shortfall is
    /// `InsufficientBalance` and nothing is broadcast.
    pub async fn send_token(
        &self,
        token: Address,
        to: &str,
        amount: &str,
        decimals: Option<u8>,
    ) -> Result<B256> {
        let to = parse_address(to)?;
        let decimals = self.resolve_decimals(token, decimals).await;
        let raw = non_zero(parse_units(amount, decimals)?, amount)?;

        let available = self.reader.token_balance(token, self.conn.address()).await?;
        if available < raw {
            warn!(%token, required = %raw, %available, "insufficient token balance");
            return Err(AgentError::InsufficientBalance {
                token,
                required: format_units(raw, decimals),
                available: format_units(available, decimals),
            });
        }

        let call = IERC20::transferCall { to, amount: raw };
        let request = TransactionRequest::default()
            .with_to(token)
            .with_input(Bytes::from(call.abi_encode()));
        let mut pending = self.submit(request).await?;
        let receipt = self.confirm(&mut pending, 1).await?;
        info!(tx_hash = %receipt.transaction_hash, %token, %to, amount, "token transfer confirmed");
        Ok(receipt.transaction_hash)
    }

    /// `decimals` if given, else the token's `decimals()`, else 18.
    pub async fn resolve_decimals(&self, token: Address, decimals: Option<u8>) -> u8 {
        if let Some(d) = decimals {
            return d;
        }
        match self.reader.token_decimals(token).await {
            Ok(d) => d,
            Err(e) => {
                warn!(%token, error = %e, "decimals() failed, assuming {FALLBACK_DECIMALS}");
                FALLBACK_DECIMALS
            }
        }
    }

    /// Sends a state-changing call and returns as soon as it is broadcast.
    ///
    /// Pass the result to [`TransactionExecutor::confirm`] to wait for it.
    pub async fn invoke(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<DynSolValue>,
        options: CallOptions,
    ) -> Result<PendingTransaction> {
        let call = MethodCall::resolve(contract, method, args)?;
        self.invoke_call(contract.address(), &call, options).await
    }

    /// [`TransactionExecutor::invoke`] with an already resolved call.
    pub async fn invoke_call(
        &self,
        contract: Address,
        call: &MethodCall,
        options: CallOptions,
    ) -> Result<PendingTransaction> {
        let mut request = TransactionRequest::default()
            .with_to(contract)
            .with_input(call.calldata()?);
        if let Some(value) = options.value {
            request.set_value(value);
        }
        if let Some(gas) = options.gas_limit {
            request.set_gas_limit(gas);
        }
        if let Some(price) = options.gas_price {
            request.set_gas_price(price);
        }
        if let Some(nonce) = options.nonce {
            request.set_nonce(nonce);
        }
        let pending = self.submit(request).await?;
        info!(method = call.name(), %contract, tx_hash = ?pending.hash, "contract call broadcast");
        Ok(pending)
    }

    /// Read-only call; returns the decoded outputs.
    pub async fn call(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<DynSolValue>,
    ) -> Result<Vec<DynSolValue>> {
        let call = MethodCall::resolve(contract, method, args)?;
        let tx = TransactionRequest::default()
            .with_from(self.conn.address())
            .with_to(contract.address())
            .with_input(call.calldata()?);
        let data = self
            .conn
            .with_client(|c| async move { c.call(tx).await })
            .await?;
        call.decode_output(&data)
    }

    /// Gas estimate for a contract method. A revert is a `Transaction` error
    /// with a non-empty reason.
    pub async fn estimate_gas(
        &self,
        contract: &ContractHandle,
        method: &str,
        args: Vec<DynSolValue>,
        options: CallOptions,
    ) -> Result<u64> {
        let call = MethodCall::resolve(contract, method, args)?;
        let mut tx = TransactionRequest::default()
            .with_from(self.conn.address())
            .with_to(contract.address())
            .with_input(call.calldata()?);
        if let Some(value) = options.value {
            tx.set_value(value);
        }
        self.reader.estimate_gas(tx).await
    }

    /// Fills nonce, gas and fee fields, signs with the held identity and
    /// broadcasts. Returns in the `Pending` state.
    ///
    /// Caller-supplied `nonce`, `gas` and `gas_price` are kept.
    pub async fn submit(&self, mut request: TransactionRequest) -> Result<PendingTransaction> {
        let identity = self.conn.identity();
        let from = identity.address();
        request.set_from(from);

        let conn = self.conn.connection().await?;
        let client = conn.client().clone();

        if request.gas.is_none() {
            let gas = self
                .conn
                .observe(client.estimate_gas(request.clone()).await)
                .await
                .map_err(ensure_reason)?;
            request.set_gas_limit(gas);
        }
        if request.gas_price.is_none() {
            let price = self.conn.observe(client.gas_price().await).await?;
            request.set_gas_price(price);
        }
        request.set_chain_id(conn.chain_id());

        let _guard = self.conn.send_guard().await;

        let nonce = match request.nonce {
            Some(n) => n,
            None => self.conn.observe(client.transaction_count(from).await).await?,
        };
        request.set_nonce(nonce);

        let mut pending = PendingTransaction {
            from,
            to: request.to.and_then(|kind| kind.to().copied()),
            value: request.value.unwrap_or_default(),
            input: request.input.input().cloned().unwrap_or_default(),
            nonce,
            gas_limit: request.gas.unwrap_or_default(),
            gas_price: request.gas_price.unwrap_or_default(),
            hash: None,
            state: TxState::Built,
            receipt: None,
        };

        let envelope = identity.sign_transaction(request).await?;
        pending.advance(TxState::Signed);

        let raw = Bytes::from(envelope.encoded_2718());
        let hash = self
            .conn
            .observe(client.send_raw_transaction(raw).await)
            .await?;
        pending.hash = Some(hash);
        pending.advance(TxState::Broadcast);
        info!(tx_hash = %hash, nonce, "transaction broadcast");
        pending.advance(TxState::Pending);
        Ok(pending)
    }

    /// Waits for `confirmations` blocks on a broadcast transaction and
    /// records the outcome on `pending`.
    pub async fn confirm(&self, pending: &mut PendingTransaction, confirmations: u64) -> Result<Receipt> {
        let hash = pending
            .hash
            .ok_or_else(|| AgentError::transaction("transaction has not been broadcast"))?;

        let receipt = self
            .wait_for_transaction(hash, confirmations, self.settings.tx_timeout)
            .await?
            .ok_or_else(|| {
                AgentError::transaction(format!(
                    "not confirmed within {}s",
                    self.settings.tx_timeout.as_secs()
                ))
                .with_tx_hash(hash)
            })?;

        pending.receipt = Some(receipt.clone());
        if receipt.is_success() {
            pending.advance(TxState::Confirmed);
            Ok(receipt)
        } else {
            pending.advance(TxState::Failed);
            warn!(tx_hash = %hash, "transaction mined with failed status");
            Err(AgentError::transaction("transaction reverted on chain").with_tx_hash(hash))
        }
    }

    /// Polls until `hash` has `confirmations` blocks on top (counting its own).
    ///
    /// Returns `Ok(None)` when `timeout` elapses first, including for hashes
    /// the node has never seen.
    pub async fn wait_for_transaction(
        &self,
        hash: B256,
        confirmations: u64,
        timeout: Duration,
    ) -> Result<Option<Receipt>> {
        let confirmations = confirmations.max(1);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(receipt) = self.reader.transaction_receipt(hash).await? {
                if let Some(mined_in) = receipt.block_number {
                    let head = self.reader.block_number().await?;
                    if head.saturating_sub(mined_in) + 1 >= confirmations {
                        return Ok(Some(receipt));
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(tx_hash = %hash, "no receipt before timeout");
                return Ok(None);
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }
}
