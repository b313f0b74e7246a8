//! # chzkit-core
//!
//! Shared types for chzkit: configuration, network metadata, the error
//! taxonomy, token maps, unit conversion and logging setup.

pub mod chain;
pub mod config;
pub mod error;
pub mod logging;
pub mod token;
pub mod units;

pub use chain::Network;
pub use config::AgentConfig;
pub use error::{AgentError, ErrorKind, Result};
pub use token::{TokenDescriptor, TokenMap};
