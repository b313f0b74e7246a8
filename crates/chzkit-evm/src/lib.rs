//! # chzkit-evm
//!
//! Chain access for chzkit agents: the connection lifecycle, read-only
//! queries, the transaction execution state machine and event subscriptions.
//!
//! ## Modules
//!
//! - [`abi`]: built-in ERC-20 ABI using alloy's `sol!` macro
//! - [`client`]: the [`ChainClient`] JSON-RPC seam and its alloy implementation
//! - [`connection`]: lazily established, shared connection and identity
//! - [`contract`]: ABI handles and resolved method calls
//! - [`events`]: live subscriptions and historical event queries
//! - [`executor`]: nonce-serialized sends and confirmation tracking
//! - [`reader`]: request/response chain queries
//! - [`types`]: receipts, blocks, logs and log queries

pub mod abi;
pub mod client;
pub mod connection;
pub mod contract;
pub mod events;
pub mod executor;
pub mod reader;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::{ChainClient, RpcChainClient};
pub use connection::{Connection, ConnectionManager, ConnectionSettings, Connector, RpcConnector};
pub use contract::{CallOptions, ContractHandle, MethodCall};
pub use events::{DecodedLog, EventFilter, EventSubscriptionRegistry};
pub use executor::{ExecutorSettings, PendingTransaction, TransactionExecutor, TxState};
pub use reader::ChainReader;
pub use types::{BlockSummary, ChainLog, LogQuery, Receipt, ReceiptStatus};

// Re-export alloy primitives used in the public API.
pub use alloy::dyn_abi::DynSolValue;
pub use alloy::primitives::{Address, B256, U256};
