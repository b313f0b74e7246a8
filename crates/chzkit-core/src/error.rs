//! Error taxonomy shared across chzkit crates.
//!
//! Every fallible public operation returns [`AgentError`]. Callers that only
//! care about the category can match on [`AgentError::kind`].

use alloy::primitives::{Address, B256};
use thiserror::Error;

/// Fieldless error category, for callers that branch on the kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Network,
    Transaction,
    InsufficientBalance,
    Validation,
}

/// Errors surfaced by the agent and its components.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Missing or malformed required settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Endpoint unreachable or transport failure. Retryable by the caller.
    #[error("network error: {0}")]
    Network(String),

    /// The node rejected or reverted the operation, or a mined receipt
    /// reported failure. `tx_hash` is set when the broadcast went through.
    #[error("transaction error: {message}{}", reason_suffix(.reason))]
    Transaction {
        message: String,
        tx_hash: Option<B256>,
        reason: Option<String>,
    },

    /// Pre-flight balance check failed; nothing was broadcast.
    #[error("insufficient balance of token {token}: required {required}, available {available}")]
    InsufficientBalance {
        token: Address,
        required: String,
        available: String,
    },

    /// Malformed address, amount, method name or argument supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(r) if !r.is_empty() => format!(" (reason: {r})"),
        _ => String::new(),
    }
}

/// Result alias for chzkit operations.
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Shorthand for a [`AgentError::Transaction`] without hash or reason.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            tx_hash: None,
            reason: None,
        }
    }

    /// Attaches a transaction hash to a `Transaction` error. Other kinds are
    /// returned unchanged.
    pub fn with_tx_hash(self, hash: B256) -> Self {
        match self {
            Self::Transaction {
                message, reason, ..
            } => Self::Transaction {
                message,
                tx_hash: Some(hash),
                reason,
            },
            other => other,
        }
    }

    /// Attaches a revert reason to a `Transaction` error. Other kinds are
    /// returned unchanged.
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Transaction {
                message, tx_hash, ..
            } => Self::Transaction {
                message,
                tx_hash,
                reason: Some(reason.into()),
            },
            other => other,
        }
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Network(_) => ErrorKind::Network,
            Self::Transaction { .. } => ErrorKind::Transaction,
            Self::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Hash of the broadcast transaction this error refers to, if any.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Transaction { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }

    /// Revert reason reported by the node, if any.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Transaction { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_display_includes_reason() {
        let err = AgentError::transaction("gas estimation failed")
            .with_reason("ERC20: transfer amount exceeds balance");
        let msg = err.to_string();
        assert!(msg.contains("gas estimation failed"));
        assert!(msg.contains("exceeds balance"));
    }

    #[test]
    fn transaction_display_without_reason() {
        let err = AgentError::transaction("receipt reports failure");
        assert_eq!(err.to_string(), "transaction error: receipt reports failure");
    }

    #[test]
    fn with_tx_hash_only_touches_transaction_errors() {
        let hash = B256::repeat_byte(0xab);
        let err = AgentError::transaction("reverted").with_tx_hash(hash);
        assert_eq!(err.tx_hash(), Some(hash));

        let other = AgentError::Network("down".into()).with_tx_hash(hash);
        assert_eq!(other.tx_hash(), None);
        assert_eq!(other.kind(), ErrorKind::Network);
    }

    #[test]
    fn kinds_and_retryability() {
        assert_eq!(
            AgentError::Configuration("x".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(AgentError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert!(AgentError::Network("x".into()).is_retryable());
        assert!(!AgentError::transaction("x").is_retryable());
    }

    #[test]
    fn insufficient_balance_display() {
        let err = AgentError::InsufficientBalance {
            token: Address::ZERO,
            required: "10.0".into(),
            available: "1.5".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0"));
        assert!(msg.contains("1.5"));
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }
}
