//! Ledger error types.

use pilot_core::{Classify, ErrorKind, TransactionId};
use thiserror::Error;

/// Errors raised while driving the ledger against a fork.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The fork executor rejected a call.
    #[error("fork executor error: {0}")]
    Executor(String),
    /// The key-value store could not be written.
    #[error("key-value store error: {0}")]
    Store(String),
    /// The fork did not produce a receipt in time.
    #[error("no receipt for {id} after {after_ms}ms")]
    ReceiptTimeout {
        /// Transaction waiting for its receipt.
        id: TransactionId,
        /// Configured wait.
        after_ms: u64,
    },
}

impl LedgerError {
    /// Error category string for logs.
    pub fn category(&self) -> &str {
        match self {
            Self::Executor(_) => "executor",
            Self::Store(_) => "store",
            Self::ReceiptTimeout { .. } => "receipt_timeout",
        }
    }
}

impl Classify for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Executor(_) | Self::Store(_) | Self::ReceiptTimeout { .. } => ErrorKind::Host,
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
