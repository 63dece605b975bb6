//! # cs-casino — Casino orchestration
//!
//! Wires the ledger and the slot machine into one application context and
//! implements the multi-step operations on top of them: slot sessions,
//! starting bonuses, transfers and exports.
//!
//! ## Architecture
//!
//! ```text
//! CasinoContext (built once, passed by reference)
//!     │
//!     ├── HashChain ── TransactionLog
//!     ├── SlotMachine
//!     └── PlayRegistry (one play per identity)
//!
//! SlotMachineSession ──start──> ActivePlay ──finish──> PlayReport
//!                                   └── net transfer → HashChain
//! ```

pub mod bonus;
pub mod context;
pub mod error;
pub mod export;
pub mod plays;
pub mod session;
pub mod settings;

pub use bonus::*;
pub use context::*;
pub use error::*;
pub use export::*;
pub use plays::*;
pub use session::*;
pub use settings::*;
