//! # cs-slot — Three-reel slot machine with exact math
//!
//! Weighted reels, a tiered fee schedule and a growing jackpot pool.
//! Probabilities, expected value and RTP are computed as exact rationals
//! from the configuration; plays are resolved into auditable outcomes.
//!
//! ## Architecture
//!
//! ```text
//! SlotMachine (reels.json)
//!     │
//!     ├── ReelConfiguration { combo_events, reels, fees, jackpot_pool }
//!     │
//!     ├── ProbabilityEngine (cached, dropped on every mutation)
//!     │       └── PiecewiseReturn → rtp(wager) → "96.5231%"
//!     │
//!     └── Play ──draw──> SpinResolver ──settle──> SpinOutcome
//! ```

pub mod config;
pub mod error;
pub mod fees;
pub mod machine;
pub mod piecewise;
pub mod probability;
pub mod rational;
pub mod spin;

pub use config::*;
pub use error::*;
pub use fees::*;
pub use machine::*;
pub use piecewise::*;
pub use probability::*;
pub use spin::*;
