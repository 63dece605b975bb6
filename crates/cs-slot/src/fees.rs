//! Fee schedule
//!
//! Every play pays a main fee and, once the wager clears the jackpot
//! threshold, a jackpot fee. Both depend on the wager's tier:
//!
//! | Tier   | Wagers   |
//! |--------|----------|
//! | lowest | 1        |
//! | low    | 2..=9    |
//! | medium | 10..=99  |
//! | high   | 100..    |
//!
//! A fee is either a fixed number of coins or a proportion of the wager.

use std::fmt;

use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::piecewise::Linear;
use crate::rational::{decimal_ratio, int, zero};

// ═══════════════════════════════════════════════════════════════════════════
// TIERS
// ═══════════════════════════════════════════════════════════════════════════

/// Wager band selecting which fees apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeTier {
    Lowest,
    Low,
    Medium,
    High,
}

impl FeeTier {
    pub const ALL: [FeeTier; 4] = [FeeTier::Lowest, FeeTier::Low, FeeTier::Medium, FeeTier::High];

    /// Tier for a wager: `< 10` is low, `< 100` is medium, `>= 100` is high
    pub fn for_wager(wager: u64) -> Self {
        match wager {
            0..=1 => FeeTier::Lowest,
            2..=9 => FeeTier::Low,
            10..=99 => FeeTier::Medium,
            _ => FeeTier::High,
        }
    }

    /// Inclusive wager range covered by the tier (`None` = unbounded)
    pub fn range(self) -> (u64, Option<u64>) {
        match self {
            FeeTier::Lowest => (1, Some(1)),
            FeeTier::Low => (2, Some(9)),
            FeeTier::Medium => (10, Some(99)),
            FeeTier::High => (100, None),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeeTier::Lowest => "lowest",
            FeeTier::Low => "low",
            FeeTier::Medium => "medium",
            FeeTier::High => "high",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for FeeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which of a tier's two fees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeKind {
    Main,
    Jackpot,
}

impl FeeKind {
    pub fn name(self) -> &'static str {
        match self {
            FeeKind::Main => "main",
            FeeKind::Jackpot => "jackpot",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "main" => Some(FeeKind::Main),
            "jackpot" => Some(FeeKind::Jackpot),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// AMOUNTS
// ═══════════════════════════════════════════════════════════════════════════

/// A single fee: `3` or `{"rate": 0.05}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeeAmount {
    Fixed(u64),
    Rate { rate: f64 },
}

impl FeeAmount {
    pub fn rate(rate: f64) -> Self {
        FeeAmount::Rate { rate }
    }

    /// Fee as a linear function of the wager
    pub fn linear(&self) -> Linear {
        match *self {
            FeeAmount::Fixed(coins) => Linear::constant(int(coins)),
            FeeAmount::Rate { rate } => Linear::proportional(decimal_ratio(rate).unwrap_or_else(zero)),
        }
    }

    /// Exact fee charged on `wager`
    pub fn amount(&self, wager: u64) -> BigRational {
        self.linear().eval(wager)
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            FeeAmount::Fixed(coins) => coins == 0,
            FeeAmount::Rate { rate } => rate == 0.0,
        }
    }
}

impl fmt::Display for FeeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeAmount::Fixed(coins) => write!(f, "{coins}"),
            FeeAmount::Rate { rate } => write!(f, "{}%", rate * 100.0),
        }
    }
}

/// Main and jackpot fee for one tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierFees {
    pub main: FeeAmount,
    pub jackpot: FeeAmount,
}

impl TierFees {
    pub fn new(main: FeeAmount, jackpot: FeeAmount) -> Self {
        Self { main, jackpot }
    }

    pub fn get(&self, kind: FeeKind) -> &FeeAmount {
        match kind {
            FeeKind::Main => &self.main,
            FeeKind::Jackpot => &self.jackpot,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCHEDULE
// ═══════════════════════════════════════════════════════════════════════════

/// Fees for all four tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub lowest: TierFees,
    pub low: TierFees,
    pub medium: TierFees,
    pub high: TierFees,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            lowest: TierFees::new(FeeAmount::Fixed(1), FeeAmount::Fixed(1)),
            low: TierFees::new(FeeAmount::Fixed(1), FeeAmount::Fixed(1)),
            medium: TierFees::new(FeeAmount::rate(0.05), FeeAmount::rate(0.01)),
            high: TierFees::new(FeeAmount::rate(0.02), FeeAmount::rate(0.005)),
        }
    }
}

impl FeeSchedule {
    pub fn tier(&self, tier: FeeTier) -> &TierFees {
        match tier {
            FeeTier::Lowest => &self.lowest,
            FeeTier::Low => &self.low,
            FeeTier::Medium => &self.medium,
            FeeTier::High => &self.high,
        }
    }

    fn tier_mut(&mut self, tier: FeeTier) -> &mut TierFees {
        match tier {
            FeeTier::Lowest => &mut self.lowest,
            FeeTier::Low => &mut self.low,
            FeeTier::Medium => &mut self.medium,
            FeeTier::High => &mut self.high,
        }
    }

    pub fn set(&mut self, tier: FeeTier, kind: FeeKind, amount: FeeAmount) {
        let fees = self.tier_mut(tier);
        match kind {
            FeeKind::Main => fees.main = amount,
            FeeKind::Jackpot => fees.jackpot = amount,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for tier in FeeTier::ALL {
            for kind in [FeeKind::Main, FeeKind::Jackpot] {
                if let FeeAmount::Rate { rate } = self.tier(tier).get(kind) {
                    if !rate.is_finite() {
                        return Err(ConfigError::InvalidFee {
                            tier: tier.name(),
                            kind: kind.name(),
                            reason: format!("rate {rate} is not a finite number"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Smallest wager that pays into the jackpot: the lowest tier's two fees
    /// charged on a single coin
    pub fn jackpot_threshold(&self) -> BigRational {
        self.lowest.main.amount(1) + self.lowest.jackpot.amount(1)
    }

    /// Whether a play at `wager` pays the jackpot fee (and so may win the pool)
    pub fn jackpot_fee_paid(&self, wager: u64) -> bool {
        let fees = self.tier(FeeTier::for_wager(wager));
        int(wager) >= self.jackpot_threshold() && !fees.jackpot.is_zero()
    }

    /// Fees charged at `wager` as a linear function, for a tier and jackpot flag
    pub fn charged_linear(&self, tier: FeeTier, jackpot_fee_paid: bool) -> Linear {
        let fees = self.tier(tier);
        let mut charged = fees.main.linear();
        if jackpot_fee_paid {
            charged = charged + fees.jackpot.linear();
        }
        charged
    }

    /// Exact fees charged on a play at `wager`
    pub fn charged(&self, wager: u64) -> BigRational {
        self.charged_linear(FeeTier::for_wager(wager), self.jackpot_fee_paid(wager))
            .eval(wager)
    }
}
