//! Error types for the ledger

use thiserror::Error;

/// Ledger errors
///
/// Only storage-level failures live here. A chain that fails verification is
/// reported as a [`crate::ChainFault`] value, not as an error.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt ledger record at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    #[error("Amount {0} exceeds the largest representable balance")]
    AmountOutOfRange(u64),

    #[error("Corrupt transaction export at row {row}: {reason}")]
    CorruptExport { row: usize, reason: String },
}

/// Result type alias
pub type LedgerResult<T> = Result<T, LedgerError>;
