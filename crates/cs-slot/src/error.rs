//! Error types for the slot machine

use std::path::PathBuf;

use thiserror::Error;

/// Reel configuration problems, detected when the file is loaded or mutated
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Reel {0} has no symbols")]
    EmptyReel(&'static str),

    #[error("Symbol {symbol} on {reel} has zero weight")]
    ZeroWeight { reel: &'static str, symbol: String },

    #[error("Symbol {0} has no combo event")]
    MissingComboEvent(String),

    #[error("Combo event {symbol}: {reason}")]
    InvalidComboEvent { symbol: String, reason: String },

    #[error("Fee {tier}/{kind}: {reason}")]
    InvalidFee {
        tier: &'static str,
        kind: &'static str,
        reason: String,
    },
}

/// Slot machine errors
#[derive(Error, Debug)]
pub enum SlotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid wager: {0}")]
    InvalidWager(u64),

    #[error("Unknown reel: {0}")]
    UnknownReel(String),

    #[error("Unknown symbol {symbol} on {reel}")]
    UnknownSymbol { reel: &'static str, symbol: String },

    #[error("Cannot remove {requested} stop(s) of {symbol} from {reel}: only {available}")]
    InsufficientStops {
        reel: &'static str,
        symbol: String,
        requested: u64,
        available: u64,
    },

    #[error("No symbol could be drawn for {0}")]
    NoSymbol(&'static str),

    #[error("Play is not fully drawn ({drawn} of 3 reels)")]
    Incomplete { drawn: usize },
}

/// Result type alias
pub type SlotResult<T> = Result<T, SlotError>;
