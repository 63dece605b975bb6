//! # cs-ledger — Hash-chained coin ledger
//!
//! Append-only block store recording every coin movement of the casino.
//! Each block carries the SHA-256 of its predecessor, so any edit to a
//! persisted record is detectable. Balances are never stored; they are
//! derived by replaying the transfers in index order.
//!
//! ## Architecture
//!
//! ```text
//! HashChain (ledger.jsonl, one Block per line)
//!     │
//!     ├── Block { index, timestamp, data, previous_hash, nonce, hash }
//!     │       └── BlockData::Transactions([{transaction: {...}}])
//!     │
//!     └── TransactionLog (transactions.tsv, derived export)
//! ```

pub mod block;
pub mod chain;
pub mod digest;
pub mod error;
pub mod transactions;

pub use block::*;
pub use chain::*;
pub use digest::*;
pub use error::*;
pub use transactions::*;
