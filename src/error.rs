//! Error types for the ledger

use thiserror::Error;

use crate::blockchain::BlockNumber;
use crate::transaction::{AccountId, BalanceLock};

/// Broad classes of failure. Callers pick the corrective action from this,
/// not from the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The block or request is malformed (reject it).
    Malformed,
    /// The block cannot extend the chain at its position (reject it).
    CannotLink,
    /// Balance or lock mismatch; treat as an integrity event.
    ValueMismatch,
    /// Older history is required than this chain retains.
    InsufficientHistory,
    /// The requested block does not exist yet.
    NotYetExists,
    /// The chain itself is in an inconsistent state.
    Fatal,
    /// Configuration or I/O problem outside the chain.
    Environment,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Structural error: {0}")]
    Structural(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Linkage error: {0}")]
    Linkage(String),

    #[error("Balance mismatch for account {account}: expected {expected}, got {actual}")]
    BalanceMismatch {
        account: AccountId,
        expected: u64,
        actual: u64,
    },

    #[error("Balance lock mismatch for account {account}: expected {expected:?}, got {actual:?}")]
    LockMismatch {
        account: AccountId,
        expected: Option<BalanceLock>,
        actual: Option<BalanceLock>,
    },

    #[error("Insufficient balance for account {account}: balance {balance}, required {required}")]
    InsufficientBalance {
        account: AccountId,
        balance: u64,
        required: u64,
    },

    #[error("Conservation error: {0}")]
    Conservation(String),

    #[error("Missing earlier blocks: block {requested} is older than the earliest retained block {earliest}")]
    HistoryGap {
        requested: BlockNumber,
        earliest: BlockNumber,
    },

    #[error("Block {requested} does not exist yet (head: {head:?})")]
    FutureBlock {
        requested: BlockNumber,
        head: Option<BlockNumber>,
    },

    #[error("Inconsistent chain state: {0}")]
    Inconsistent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::Structural(_) | ChainError::InvalidSignature(_) | ChainError::Encoding(_) => {
                ErrorKind::Malformed
            }
            ChainError::Linkage(_) => ErrorKind::CannotLink,
            ChainError::BalanceMismatch { .. }
            | ChainError::LockMismatch { .. }
            | ChainError::InsufficientBalance { .. }
            | ChainError::Conservation(_) => ErrorKind::ValueMismatch,
            ChainError::HistoryGap { .. } => ErrorKind::InsufficientHistory,
            ChainError::FutureBlock { .. } => ErrorKind::NotYetExists,
            ChainError::Inconsistent(_) => ErrorKind::Fatal,
            ChainError::Config(_) | ChainError::Io(_) => ErrorKind::Environment,
        }
    }

    /// Account named by a value mismatch, if any.
    pub fn account(&self) -> Option<&str> {
        match self {
            ChainError::BalanceMismatch { account, .. }
            | ChainError::LockMismatch { account, .. }
            | ChainError::InsufficientBalance { account, .. } => Some(account),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
