//! In-memory chain for tests.
//!
//! [`FakeChain`] implements [`ChainClient`] without a node: it tracks
//! balances, nonces and ERC-20 ledgers, validates and "mines" signed
//! transactions one block each, and pushes logs to live subscribers.
//! [`FakeConnector`] hands it to a [`ConnectionManager`](crate::ConnectionManager).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, FixedBytes, B256, U256};
use alloy::rpc::types::{BlockId, BlockNumberOrTag, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use chzkit_core::{AgentError, Result};
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};

use crate::abi::IERC20;
use crate::client::ChainClient;
use crate::connection::{ConnectionSettings, Connector};
use crate::types::{BlockSummary, ChainLog, LogQuery, Receipt, ReceiptStatus};

const DEFAULT_GAS_PRICE: u128 = 2_500_000_000_000;
const CALL_GAS: u64 = 65_000;
const TRANSFER_GAS: u64 = 21_000;

#[derive(Default)]
struct TokenLedger {
    decimals: Option<u8>,
    symbol: String,
    balances: HashMap<Address, U256>,
}

#[derive(Default)]
struct State {
    head: u64,
    gas_price: u128,
    nonces: HashMap<Address, u64>,
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, TokenLedger>,
    receipts: HashMap<B256, Receipt>,
    withheld: Vec<Receipt>,
    sent: Vec<TxEnvelope>,
    logs: Vec<ChainLog>,
    code: HashMap<Address, Bytes>,
    storage: HashMap<(Address, U256), B256>,
    call_responses: HashMap<(Address, FixedBytes<4>), Bytes>,
    reverting: HashSet<Address>,
    estimate_revert: Option<String>,
    subscribers: Vec<(LogQuery, mpsc::UnboundedSender<ChainLog>)>,
}

/// An in-memory EVM node.
pub struct FakeChain {
    chain_id: u64,
    state: Mutex<State>,
    broadcasts: AtomicUsize,
    auto_mine: AtomicBool,
    unreachable: AtomicBool,
}

impl FakeChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(State {
                head: 1,
                gas_price: DEFAULT_GAS_PRICE,
                ..State::default()
            }),
            broadcasts: AtomicUsize::new(0),
            auto_mine: AtomicBool::new(true),
            unreachable: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(AgentError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    // ---- setup ----

    pub fn fund(&self, address: Address, amount: U256) {
        self.state().native.insert(address, amount);
    }

    /// Registers an ERC-20 token. `decimals: None` makes `decimals()` revert.
    pub fn deploy_token(&self, token: Address, symbol: &str, decimals: Option<u8>) {
        let mut state = self.state();
        state.code.insert(token, Bytes::from_static(&[0x60, 0x80]));
        state.tokens.insert(
            token,
            TokenLedger {
                decimals,
                symbol: symbol.to_string(),
                balances: HashMap::new(),
            },
        );
    }

    pub fn mint(&self, token: Address, owner: Address, amount: U256) {
        if let Some(ledger) = self.state().tokens.get_mut(&token) {
            *ledger.balances.entry(owner).or_default() += amount;
        }
    }

    pub fn set_gas_price(&self, price: u128) {
        self.state().gas_price = price;
    }

    /// Makes every gas estimate revert with `reason`.
    pub fn set_estimate_revert(&self, reason: Option<&str>) {
        self.state().estimate_revert = reason.map(str::to_string);
    }

    /// Canned `eth_call` result for `selector` on `to`.
    pub fn set_call_response(&self, to: Address, selector: FixedBytes<4>, output: Bytes) {
        self.state().call_responses.insert((to, selector), output);
    }

    /// Transactions sent to `address` are mined with a failed status.
    pub fn revert_calls_to(&self, address: Address) {
        self.state().reverting.insert(address);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state().code.insert(address, code);
    }

    pub fn set_storage(&self, address: Address, slot: U256, value: B256) {
        self.state().storage.insert((address, slot), value);
    }

    /// When disabled, accepted transactions stay pending until [`FakeChain::mine_pending`].
    pub fn set_auto_mine(&self, enabled: bool) {
        self.auto_mine.store(enabled, Ordering::SeqCst);
    }

    /// Every call fails with a `Network` error while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    // ---- chain progress ----

    /// Mines withheld transactions, one block each.
    pub fn mine_pending(&self) {
        let mut state = self.state();
        let withheld = std::mem::take(&mut state.withheld);
        for mut receipt in withheld {
            state.head += 1;
            receipt.block_number = Some(state.head);
            for log in &mut receipt.logs {
                log.block_number = Some(state.head);
            }
            Self::publish(&mut state, receipt.logs.clone());
            state.receipts.insert(receipt.transaction_hash, receipt);
        }
    }

    /// Advances the head by `blocks` empty blocks.
    pub fn mine_empty(&self, blocks: u64) {
        self.state().head += blocks;
    }

    /// Stores `log` and pushes it to matching subscribers.
    pub fn emit_log(&self, mut log: ChainLog) {
        let mut state = self.state();
        if log.block_number.is_none() {
            log.block_number = Some(state.head);
        }
        Self::publish(&mut state, vec![log]);
    }

    /// Closes every live subscription stream, as a dropped WebSocket would.
    pub fn drop_subscriptions(&self) {
        self.state().subscribers.clear();
    }

    fn publish(state: &mut State, logs: Vec<ChainLog>) {
        for log in logs {
            state
                .subscribers
                .retain(|(query, tx)| !query.matches(&log) || tx.unbounded_send(log.clone()).is_ok());
            state.logs.push(log);
        }
    }

    // ---- inspection ----

    /// Number of `eth_sendRawTransaction` calls received, accepted or not.
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    /// Accepted transactions in arrival order.
    pub fn sent_transactions(&self) -> Vec<TxEnvelope> {
        self.state().sent.clone()
    }

    pub fn nonce_of(&self, address: Address) -> u64 {
        self.state().nonces.get(&address).copied().unwrap_or(0)
    }

    pub fn native_balance(&self, address: Address) -> U256 {
        self.state().native.get(&address).copied().unwrap_or_default()
    }

    pub fn token_balance(&self, token: Address, owner: Address) -> U256 {
        self.state()
            .tokens
            .get(&token)
            .and_then(|l| l.balances.get(&owner).copied())
            .unwrap_or_default()
    }

    pub fn head(&self) -> u64 {
        self.state().head
    }

    /// Live subscriber channels whose receiver has not been dropped.
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state();
        state.subscribers.retain(|(_, tx)| !tx.is_closed());
        state.subscribers.len()
    }

    // ---- execution ----

    fn token_call(state: &State, to: Address, from: Address, input: &[u8]) -> Result<Option<Bytes>> {
        let Some(ledger) = state.tokens.get(&to) else {
            return Ok(None);
        };
        let revert = |reason: &str| AgentError::transaction("execution reverted").with_reason(reason);

        if let Ok(call) = IERC20::balanceOfCall::abi_decode(input) {
            let balance = ledger.balances.get(&call.owner).copied().unwrap_or_default();
            return Ok(Some(IERC20::balanceOfCall::abi_encode_returns(&balance).into()));
        }
        if IERC20::decimalsCall::abi_decode(input).is_ok() {
            let decimals = ledger.decimals.ok_or_else(|| revert("decimals() not implemented"))?;
            return Ok(Some(IERC20::decimalsCall::abi_encode_returns(&decimals).into()));
        }
        if IERC20::symbolCall::abi_decode(input).is_ok() {
            return Ok(Some(IERC20::symbolCall::abi_encode_returns(&ledger.symbol).into()));
        }
        if let Ok(call) = IERC20::transferCall::abi_decode(input) {
            let balance = ledger.balances.get(&from).copied().unwrap_or_default();
            if balance < call.amount {
                return Err(revert("ERC20: transfer amount exceeds balance"));
            }
            return Ok(Some(IERC20::transferCall::abi_encode_returns(&true).into()));
        }
        Ok(None)
    }

    fn selector(input: &[u8]) -> FixedBytes<4> {
        input
            .get(..4)
            .map(FixedBytes::<4>::from_slice)
            .unwrap_or_default()
    }

    fn apply(state: &mut State, envelope: &TxEnvelope, from: Address, hash: B256) -> Receipt {
        let to = envelope.to();
        let input = envelope.input().clone();
        let mut status = ReceiptStatus::Success;
        let mut logs = Vec::new();

        if let Some(to) = to {
            if state.reverting.contains(&to) {
                status = ReceiptStatus::Failed;
            } else if let Some(ledger) = state.tokens.get_mut(&to) {
                match IERC20::transferCall::abi_decode(&input) {
                    Ok(call) => {
                        let from_balance = ledger.balances.get(&from).copied().unwrap_or_default();
                        if from_balance < call.amount {
                            status = ReceiptStatus::Failed;
                        } else {
                            ledger.balances.insert(from, from_balance - call.amount);
                            *ledger.balances.entry(call.to).or_default() += call.amount;
                            let data = IERC20::Transfer {
                                from,
                                to: call.to,
                                value: call.amount,
                            }
                            .encode_log_data();
                            logs.push(ChainLog {
                                address: to,
                                topics: data.topics().to_vec(),
                                data: data.data.clone(),
                                block_number: None,
                                transaction_hash: Some(hash),
                                log_index: Some(0),
                            });
                        }
                    }
                    Err(_) if !input.is_empty() => status = ReceiptStatus::Failed,
                    Err(_) => {}
                }
            }
        }

        if status == ReceiptStatus::Success {
            let value = envelope.value();
            if let Some(to) = to {
                *state.native.entry(from).or_default() -= value;
                *state.native.entry(to).or_default() += value;
            }
        }

        Receipt {
            transaction_hash: hash,
            block_number: None,
            status,
            gas_used: if input.is_empty() { TRANSFER_GAS } else { CALL_GAS },
            from,
            to,
            contract_address: None,
            logs,
        }
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn chain_id(&self) -> Result<u64> {
        self.reachable()?;
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64> {
        self.reachable()?;
        Ok(self.state().head)
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.reachable()?;
        let nonce = self.nonce_of(address);
        // Lets other tasks run between the read and the caller's broadcast,
        // as a real round trip would.
        tokio::task::yield_now().await;
        Ok(nonce)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.reachable()?;
        Ok(self.state().gas_price)
    }

    async fn estimate_gas(&self, tx: TransactionRequest) -> Result<u64> {
        self.reachable()?;
        let state = self.state();
        if let Some(reason) = &state.estimate_revert {
            return Err(AgentError::transaction("eth_estimateGas: execution reverted").with_reason(reason.clone()));
        }
        let input = tx.input.input().cloned().unwrap_or_default();
        if input.is_empty() {
            return Ok(TRANSFER_GAS);
        }
        if let Some(to) = tx.to.and_then(|k| k.to().copied()) {
            if state.reverting.contains(&to) {
                return Err(AgentError::transaction("eth_estimateGas: execution reverted").with_reason("execution reverted"));
            }
            let from = tx.from.unwrap_or_default();
            Self::token_call(&state, to, from, &input)?;
        }
        Ok(CALL_GAS)
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
        self.reachable()?;
        let state = self.state();
        let to = tx
            .to
            .and_then(|k| k.to().copied())
            .ok_or_else(|| AgentError::transaction("eth_call: missing target"))?;
        let input = tx.input.input().cloned().unwrap_or_default();
        if let Some(out) = state.call_responses.get(&(to, Self::selector(&input))) {
            return Ok(out.clone());
        }
        let from = tx.from.unwrap_or_default();
        match Self::token_call(&state, to, from, &input)? {
            Some(out) => Ok(out),
            None => Err(AgentError::transaction("eth_call: execution reverted").with_reason("execution reverted")),
        }
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.reachable()?;
        Ok(self.native_balance(address))
    }

    async fn block(&self, number: BlockNumberOrTag) -> Result<Option<BlockSummary>> {
        self.reachable()?;
        let state = self.state();
        let n = match number {
            BlockNumberOrTag::Number(n) => n,
            BlockNumberOrTag::Earliest => 0,
            _ => state.head,
        };
        if n > state.head {
            return Ok(None);
        }
        let hash_of = |n: u64| keccak256(n.to_be_bytes());
        Ok(Some(BlockSummary {
            number: n,
            hash: hash_of(n),
            parent_hash: if n == 0 { B256::ZERO } else { hash_of(n - 1) },
            timestamp: 1_700_000_000 + n * 3,
            gas_used: 0,
            gas_limit: 30_000_000,
            base_fee_per_gas: None,
            transaction_count: state
                .receipts
                .values()
                .filter(|r| r.block_number == Some(n))
                .count(),
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.reachable()?;
        Ok(self.state().receipts.get(&hash).cloned())
    }

    async fn code(&self, address: Address, _block: BlockId) -> Result<Bytes> {
        self.reachable()?;
        Ok(self.state().code.get(&address).cloned().unwrap_or_default())
    }

    async fn storage_at(&self, address: Address, slot: U256, _block: BlockId) -> Result<B256> {
        self.reachable()?;
        Ok(self
            .state()
            .storage
            .get(&(address, slot))
            .copied()
            .unwrap_or_default())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<ChainLog>> {
        self.reachable()?;
        let state = self.state();
        Ok(state
            .logs
            .iter()
            .filter(|log| query.matches(log))
            .filter(|log| {
                log.block_number
                    .is_none_or(|n| query.contains_block(n, state.head))
            })
            .cloned()
            .collect())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        self.reachable()?;
        self.broadcasts.fetch_add(1, Ordering::SeqCst);

        let mut buf: &[u8] = raw.as_ref();
        let envelope = TxEnvelope::decode_2718(&mut buf)
            .map_err(|e| AgentError::transaction(format!("invalid transaction: {e}")))?;
        let from = envelope
            .recover_signer()
            .map_err(|e| AgentError::transaction(format!("invalid signature: {e}")))?;
        if envelope.chain_id() != Some(self.chain_id) {
            return Err(AgentError::transaction("invalid chain id"));
        }

        let mut state = self.state();
        let expected = state.nonces.get(&from).copied().unwrap_or(0);
        match envelope.nonce() {
            n if n < expected => return Err(AgentError::transaction("nonce too low")),
            n if n > expected => return Err(AgentError::transaction("nonce too high")),
            _ => {}
        }
        let cost = envelope.value()
            + U256::from(envelope.gas_limit()) * U256::from(envelope.gas_price().unwrap_or_default());
        let funds = state.native.get(&from).copied().unwrap_or_default();
        if funds < cost {
            return Err(AgentError::transaction("insufficient funds for gas * price + value"));
        }

        let hash = *envelope.tx_hash();
        state.nonces.insert(from, expected + 1);
        let receipt = Self::apply(&mut state, &envelope, from, hash);
        state.sent.push(envelope);

        if self.auto_mine.load(Ordering::SeqCst) {
            state.head += 1;
            let head = state.head;
            let mut receipt = receipt;
            receipt.block_number = Some(head);
            for log in &mut receipt.logs {
                log.block_number = Some(head);
            }
            Self::publish(&mut state, receipt.logs.clone());
            state.receipts.insert(hash, receipt);
        } else {
            state.withheld.push(receipt);
        }
        Ok(hash)
    }

    async fn subscribe_logs(&self, query: LogQuery) -> Result<BoxStream<'static, ChainLog>> {
        self.reachable()?;
        let (tx, rx) = mpsc::unbounded();
        self.state().subscribers.push((query, tx));
        Ok(rx.boxed())
    }
}

/// [`Connector`] that hands out a shared [`FakeChain`] and counts connects.
pub struct FakeConnector {
    chain: Arc<FakeChain>,
    connects: AtomicUsize,
    refuse: AtomicBool,
}

impl FakeConnector {
    pub fn new(chain: Arc<FakeChain>) -> Self {
        Self {
            chain,
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes the next connects fail as if the endpoint were down.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn ChainClient>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(AgentError::Network("connection refused".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let client: Arc<dyn ChainClient> = self.chain.clone();
        Ok(client)
    }
}
