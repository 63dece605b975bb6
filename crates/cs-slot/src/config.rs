//! Reel configuration
//!
//! Strongly typed mirror of the machine's JSON file:
//!
//! ```json
//! {
//!   "combo_events": { "small_win": { "fixed_amount": 3, "wager_multiplier": 1.0 }, ... },
//!   "reels": { "reel1": { "small_win": 8, ... }, "reel2": { ... }, "reel3": { ... } },
//!   "fees": { "lowest": { "main": 1, "jackpot": 1 }, ..., "high": { "main": { "rate": 0.02 }, ... } },
//!   "jackpot_pool": 1000,
//!   "new_bonus_wait_seconds": 30,
//!   "starting_bonus_die_enabled": true
//! }
//! ```
//!
//! Everything is validated when loaded, so play resolution never meets a
//! missing key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SlotError, SlotResult};
use crate::fees::{FeeKind, FeeSchedule, FeeTier};
use crate::rational::decimal_ratio;

/// Combo that forfeits the whole wager
pub const LOSE_WAGER: &str = "lose_wager";

/// Combo that wins the jackpot pool
pub const JACKPOT: &str = "jackpot";

/// Default seconds a front end waits before auto-rolling the starting bonus die
const DEFAULT_BONUS_WAIT_SECONDS: u64 = 30;

// ═══════════════════════════════════════════════════════════════════════════
// REELS
// ═══════════════════════════════════════════════════════════════════════════

/// One of the three reels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReelId {
    Reel1,
    Reel2,
    Reel3,
}

impl ReelId {
    pub const ALL: [ReelId; 3] = [ReelId::Reel1, ReelId::Reel2, ReelId::Reel3];

    /// Key used in the configuration file
    pub fn name(self) -> &'static str {
        match self {
            ReelId::Reel1 => "reel1",
            ReelId::Reel2 => "reel2",
            ReelId::Reel3 => "reel3",
        }
    }

    /// Parse a reel key ("reel1".."reel3")
    pub fn parse(name: &str) -> SlotResult<Self> {
        match name {
            "reel1" => Ok(ReelId::Reel1),
            "reel2" => Ok(ReelId::Reel2),
            "reel3" => Ok(ReelId::Reel3),
            other => Err(SlotError::UnknownReel(other.to_string())),
        }
    }
}

impl fmt::Display for ReelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Symbol name → number of stops bearing it
pub type ReelStops = BTreeMap<String, u64>;

/// Stop counts for all three reels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reels {
    pub reel1: ReelStops,
    pub reel2: ReelStops,
    pub reel3: ReelStops,
}

impl Reels {
    /// Same stops on every reel
    pub fn uniform(stops: ReelStops) -> Self {
        Self {
            reel1: stops.clone(),
            reel2: stops.clone(),
            reel3: stops,
        }
    }

    pub fn get(&self, reel: ReelId) -> &ReelStops {
        match reel {
            ReelId::Reel1 => &self.reel1,
            ReelId::Reel2 => &self.reel2,
            ReelId::Reel3 => &self.reel3,
        }
    }

    pub fn get_mut(&mut self, reel: ReelId) -> &mut ReelStops {
        match reel {
            ReelId::Reel1 => &mut self.reel1,
            ReelId::Reel2 => &mut self.reel2,
            ReelId::Reel3 => &mut self.reel3,
        }
    }

    /// Total stops on a reel
    pub fn total_weight(&self, reel: ReelId) -> u64 {
        self.get(reel).values().sum()
    }

    /// Every symbol appearing on any reel
    pub fn symbols(&self) -> BTreeSet<&str> {
        ReelId::ALL
            .iter()
            .flat_map(|&r| self.get(r).keys().map(String::as_str))
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMBO EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Payout rule for three matching symbols
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComboEvent {
    /// Coins added to the return (the jackpot seed for the jackpot combo)
    pub fixed_amount: u64,
    /// Multiple of the wager returned; -1.0 with no fixed amount loses the wager
    pub wager_multiplier: f64,
}

impl ComboEvent {
    pub fn new(fixed_amount: u64, wager_multiplier: f64) -> Self {
        Self {
            fixed_amount,
            wager_multiplier,
        }
    }

    /// The canonical "lose the whole wager" rule
    pub fn lose_wager() -> Self {
        Self::new(0, -1.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// REEL CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

/// Full machine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelConfiguration {
    pub combo_events: BTreeMap<String, ComboEvent>,
    pub reels: Reels,
    pub fees: FeeSchedule,
    /// Current jackpot pool, never below the seed
    pub jackpot_pool: u64,
    #[serde(default = "default_bonus_wait")]
    pub new_bonus_wait_seconds: u64,
    #[serde(default)]
    pub starting_bonus_die_enabled: bool,
}

fn default_bonus_wait() -> u64 {
    DEFAULT_BONUS_WAIT_SECONDS
}

impl ReelConfiguration {
    /// Configuration written when no usable file exists
    pub fn template() -> Self {
        let mut combo_events = BTreeMap::new();
        combo_events.insert(LOSE_WAGER.to_string(), ComboEvent::lose_wager());
        combo_events.insert("small_win".to_string(), ComboEvent::new(1, 1.5));
        combo_events.insert("medium_win".to_string(), ComboEvent::new(2, 3.0));
        combo_events.insert("high_win".to_string(), ComboEvent::new(5, 10.0));
        combo_events.insert(JACKPOT.to_string(), ComboEvent::new(1000, 1.0));

        let stops: ReelStops = [
            (LOSE_WAGER, 2),
            ("small_win", 8),
            ("medium_win", 5),
            ("high_win", 3),
            (JACKPOT, 1),
        ]
        .into_iter()
        .map(|(s, n)| (s.to_string(), n))
        .collect();

        Self {
            combo_events,
            reels: Reels::uniform(stops),
            fees: FeeSchedule::default(),
            jackpot_pool: 1000,
            new_bonus_wait_seconds: DEFAULT_BONUS_WAIT_SECONDS,
            starting_bonus_die_enabled: true,
        }
    }

    /// Read, parse and validate a configuration file.
    /// A pool found below the seed is raised to it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Err(ConfigError::NotFound(path.to_path_buf())),
        };
        let mut config: ReelConfiguration = serde_json::from_str(&content)?;
        config.validate()?;
        if config.clamp_jackpot() {
            log::warn!(
                "Jackpot pool below seed in {}, raised to {}",
                path.display(),
                config.jackpot_pool
            );
        }
        Ok(config)
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> SlotResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check every invariant the probability engine and resolver rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for reel in ReelId::ALL {
            let stops = self.reels.get(reel);
            if stops.is_empty() {
                return Err(ConfigError::EmptyReel(reel.name()));
            }
            for (symbol, &weight) in stops {
                if weight == 0 {
                    return Err(ConfigError::ZeroWeight {
                        reel: reel.name(),
                        symbol: symbol.clone(),
                    });
                }
                if !self.combo_events.contains_key(symbol) {
                    return Err(ConfigError::MissingComboEvent(symbol.clone()));
                }
            }
        }

        let first: BTreeSet<&String> = self.reels.reel1.keys().collect();
        for reel in [ReelId::Reel2, ReelId::Reel3] {
            let other: BTreeSet<&String> = self.reels.get(reel).keys().collect();
            if other != first {
                log::warn!("{} lists a different symbol set than reel1", reel);
            }
        }

        for (symbol, event) in &self.combo_events {
            if decimal_ratio(event.wager_multiplier).is_none() {
                return Err(ConfigError::InvalidComboEvent {
                    symbol: symbol.clone(),
                    reason: "wager_multiplier must be finite".to_string(),
                });
            }
        }

        self.fees.validate()
    }

    /// Jackpot seed: the jackpot combo's fixed amount (0 without a jackpot combo)
    pub fn jackpot_seed(&self) -> u64 {
        self.combo_events
            .get(JACKPOT)
            .map(|e| e.fixed_amount)
            .unwrap_or(0)
    }

    /// Raise the pool to the seed if needed. Returns `true` if it changed.
    pub fn clamp_jackpot(&mut self) -> bool {
        let seed = self.jackpot_seed();
        if self.jackpot_pool < seed {
            self.jackpot_pool = seed;
            true
        } else {
            false
        }
    }

    /// Add `count` stops of `symbol` to a reel
    pub fn add_symbol_count(&mut self, reel: ReelId, symbol: &str, count: u64) {
        *self
            .reels
            .get_mut(reel)
            .entry(symbol.to_string())
            .or_insert(0) += count;
    }

    /// Remove `count` stops of `symbol` from a reel; the symbol disappears at zero
    pub fn remove_symbol_count(&mut self, reel: ReelId, symbol: &str, count: u64) -> SlotResult<()> {
        let stops = self.reels.get_mut(reel);
        let available = stops
            .get(symbol)
            .copied()
            .ok_or_else(|| SlotError::UnknownSymbol {
                reel: reel.name(),
                symbol: symbol.to_string(),
            })?;
        if count > available {
            return Err(SlotError::InsufficientStops {
                reel: reel.name(),
                symbol: symbol.to_string(),
                requested: count,
                available,
            });
        }
        if count == available {
            stops.remove(symbol);
        } else {
            stops.insert(symbol.to_string(), available - count);
        }
        Ok(())
    }

    /// Replace one fee entry
    pub fn set_fee(&mut self, tier: FeeTier, kind: FeeKind, amount: crate::fees::FeeAmount) {
        self.fees.set(tier, kind, amount);
    }
}

impl Default for ReelConfiguration {
    fn default() -> Self {
        Self::template()
    }
}
