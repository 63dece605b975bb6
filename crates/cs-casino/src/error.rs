//! Error types for casino orchestration

use cs_ledger::{ChainFault, LedgerError};
use cs_slot::SlotError;
use thiserror::Error;

/// Text shown to players for any internal failure
pub const GENERIC_USER_MESSAGE: &str = "An error occurred, contact an administrator.";

/// Casino errors
#[derive(Error, Debug)]
pub enum CasinoError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Slot machine error: {0}")]
    Slot(#[from] SlotError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ledger integrity violated: {0}")]
    ChainInvalid(ChainFault),
}

impl CasinoError {
    /// What a player may see. Internal detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        GENERIC_USER_MESSAGE
    }

    /// Whether the host process must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, CasinoError::ChainInvalid(_))
    }
}

/// Result type alias
pub type CasinoResult<T> = Result<T, CasinoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cs_ledger::FaultKind;

    #[test]
    fn test_user_message_hides_detail() {
        let err = CasinoError::Io(std::io::Error::other("/secret/path/ledger.jsonl"));
        assert!(!err.user_message().contains("secret"));
        assert_eq!(err.user_message(), GENERIC_USER_MESSAGE);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_integrity_errors_are_fatal() {
        let fault = ChainFault {
            index: 3,
            kind: FaultKind::BrokenLink,
        };
        let err = CasinoError::ChainInvalid(fault);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Ledger integrity violated: block 3: previous_hash mismatch");
    }
}
