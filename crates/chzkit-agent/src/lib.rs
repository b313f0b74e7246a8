//! # chzkit-agent
//!
//! The single entry point for chzkit callers.
//!
//! ## Modules
//!
//! - [`agent`]: [`Agent`]: startup validation, shared components, shutdown
//! - [`tools`]: text-in/text-out tool registry for LLM tool calling

pub mod agent;
pub mod tools;

pub use agent::Agent;
pub use tools::{ToolName, ToolRegistry, ToolSpec};

pub use chzkit_core::{AgentConfig, AgentError, ErrorKind, Network, Result, TokenDescriptor, TokenMap};
pub use chzkit_evm::{
    CallOptions, ContractHandle, DecodedLog, EventFilter, PendingTransaction, Receipt, TxState,
};
