//! Domain types exchanged over the [`ChainClient`](crate::client::ChainClient) seam,
//! and conversions from alloy's RPC types.

use alloy::primitives::{Address, Bytes, LogData, B256};
use alloy::rpc::types::{Block, BlockNumberOrTag, Filter, Log, TransactionReceipt};
use serde::Serialize;

/// Outcome recorded in a mined receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failed,
}

/// A mined transaction's receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub status: ReceiptStatus,
    pub gas_used: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    pub logs: Vec<ChainLog>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        let status = if receipt.status() {
            ReceiptStatus::Success
        } else {
            ReceiptStatus::Failed
        };
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            status,
            gas_used: receipt.gas_used,
            from: receipt.from,
            to: receipt.to,
            contract_address: receipt.contract_address,
            logs: receipt.inner.logs().iter().map(ChainLog::from).collect(),
        }
    }
}

/// Header-level view of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub transaction_count: usize,
}

impl From<Block> for BlockSummary {
    fn from(block: Block) -> Self {
        Self {
            number: block.header.number,
            hash: block.header.hash,
            parent_hash: block.header.parent_hash,
            timestamp: block.header.timestamp,
            gas_used: block.header.gas_used,
            gas_limit: block.header.gas_limit,
            base_fee_per_gas: block.header.base_fee_per_gas,
            transaction_count: block.transactions.len(),
        }
    }
}

/// A raw event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl ChainLog {
    /// Topics and data as alloy `LogData`, for ABI decoding.
    pub fn log_data(&self) -> LogData {
        LogData::new_unchecked(self.topics.clone(), self.data.clone())
    }
}

impl From<&Log> for ChainLog {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address(),
            topics: log.topics().to_vec(),
            data: log.data().data.clone(),
            block_number: log.block_number,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index,
        }
    }
}

impl From<Log> for ChainLog {
    fn from(log: Log) -> Self {
        Self::from(&log)
    }
}

/// Log filter: an optional emitter, up to four topic constraints and a block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Option<Address>,
    /// `topics[0]` is the event signature hash; `None` matches anything.
    pub topics: [Option<B256>; 4],
    pub from_block: BlockNumberOrTag,
    pub to_block: BlockNumberOrTag,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            address: None,
            topics: [None; 4],
            from_block: BlockNumberOrTag::Earliest,
            to_block: BlockNumberOrTag::Latest,
        }
    }
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn event_signature(mut self, signature: B256) -> Self {
        self.topics[0] = Some(signature);
        self
    }

    /// Constrains indexed topic `index` (1..=3).
    pub fn topic(mut self, index: usize, value: B256) -> Self {
        if (1..4).contains(&index) {
            self.topics[index] = Some(value);
        }
        self
    }

    pub fn from_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.from_block = block.into();
        self
    }

    pub fn to_block(mut self, block: impl Into<BlockNumberOrTag>) -> Self {
        self.to_block = block.into();
        self
    }

    /// The equivalent alloy RPC filter.
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new()
            .from_block(self.from_block)
            .to_block(self.to_block);
        if let Some(address) = self.address {
            filter = filter.address(address);
        }
        if let Some(sig) = self.topics[0] {
            filter = filter.event_signature(sig);
        }
        if let Some(t) = self.topics[1] {
            filter = filter.topic1(t);
        }
        if let Some(t) = self.topics[2] {
            filter = filter.topic2(t);
        }
        if let Some(t) = self.topics[3] {
            filter = filter.topic3(t);
        }
        filter
    }

    /// Whether `log` satisfies the address and topic constraints.
    ///
    /// Block bounds are not checked here; callers that hold numbered blocks
    /// check them with [`LogQuery::contains_block`].
    pub fn matches(&self, log: &ChainLog) -> bool {
        if self.address.is_some_and(|a| a != log.address) {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            Some(t) => log.topics.get(i) == Some(t),
            None => true,
        })
    }

    /// Whether `block` falls inside the query's range, given the current head.
    pub fn contains_block(&self, block: u64, head: u64) -> bool {
        let resolve = |tag: BlockNumberOrTag, default: u64| match tag {
            BlockNumberOrTag::Number(n) => n,
            BlockNumberOrTag::Earliest => 0,
            _ => default,
        };
        let from = resolve(self.from_block, head);
        let to = resolve(self.to_block, head);
        (from..=to).contains(&block)
    }
}
