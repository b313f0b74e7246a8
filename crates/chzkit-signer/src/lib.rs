//! # chzkit-signer
//!
//! The process-wide signing identity: secret parsing, address derivation,
//! transaction signing and EIP-191 message signing/recovery.

pub mod identity;

pub use identity::{parse_signature, signature_hex, Identity, SignerError};
