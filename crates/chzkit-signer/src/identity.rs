//! The in-memory signing identity.
//!
//! An [`Identity`] is created once from a `0x`-prefixed hex secret and then
//! shared (behind an `Arc`) for the lifetime of the process. The secret is
//! never serialized and never printed.

use std::fmt;

use alloy::consensus::TxEnvelope;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Signature};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use chzkit_core::config::validate_private_key;
use chzkit_core::AgentError;
use thiserror::Error;
use tracing::debug;

/// Errors arising from identity operations.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl From<SignerError> for AgentError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::InvalidKey(_) => AgentError::Configuration(err.to_string()),
            SignerError::Signing(_) => AgentError::transaction(err.to_string()),
            SignerError::InvalidSignature(_) => AgentError::Validation(err.to_string()),
        }
    }
}

/// Result alias for identity operations.
pub type Result<T> = std::result::Result<T, SignerError>;

/// A single private key and the address derived from it.
#[derive(Clone)]
pub struct Identity {
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Identity {
    /// Parses a `0x`-prefixed 32-byte hex secret.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        validate_private_key(secret).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let signer: PrivateKeySigner = secret
            .parse()
            .map_err(|e| SignerError::InvalidKey(format!("{e}")))?;
        Ok(Self::from_signer(signer))
    }

    /// Wraps an already constructed alloy signer.
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        let wallet = EthereumWallet::from(signer.clone());
        debug!(address = %signer.address(), "identity loaded");
        Self { signer, wallet }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// The alloy wallet holding this identity, for provider fillers.
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }

    /// Signs a fully populated request (nonce, gas, fees, chain id).
    ///
    /// `from` is forced to this identity's address.
    pub async fn sign_transaction(&self, tx: TransactionRequest) -> Result<TxEnvelope> {
        let tx = tx.with_from(self.address());
        tx.build(&self.wallet)
            .await
            .map_err(|e| SignerError::Signing(e.to_string()))
    }

    /// EIP-191 personal-message signature.
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        debug!(address = %self.address(), len = message.len(), "signing message");
        self.signer
            .sign_message_sync(message)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }

    /// Recovers the address that produced `signature` over `message`.
    pub fn verify_message(message: &[u8], signature: &Signature) -> Result<Address> {
        signature
            .recover_address_from_msg(message)
            .map_err(|e| SignerError::InvalidSignature(e.to_string()))
    }

    /// Whether `signature` over `message` was produced by this identity.
    pub fn is_own_signature(&self, message: &[u8], signature: &Signature) -> bool {
        matches!(Self::verify_message(message, signature), Ok(addr) if addr == self.address())
    }
}

/// Parses a 65-byte `0x`-prefixed hex signature.
pub fn parse_signature(hex_sig: &str) -> Result<Signature> {
    let bytes = hex::decode(hex_sig.trim().trim_start_matches("0x"))
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))?;
    Signature::from_raw(&bytes).map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

/// `0x`-prefixed hex encoding of a 65-byte signature.
pub fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}
