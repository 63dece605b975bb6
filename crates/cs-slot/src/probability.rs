//! Exact probability, expected value and RTP
//!
//! All arithmetic is on [`BigRational`]; floats only appear when a ratio
//! is finally rendered as a percentage.
//!
//! ## Model
//!
//! Reels are independent. A combo event is all three reels showing the
//! same symbol, so
//!
//! ```text
//! P(symbol)        = Π_reel count(symbol, reel) / total_weight(reel)
//! P(standard_lose) = 1 − Σ_symbol P(symbol)
//! ```
//!
//! Per play at wager `w` with fees `F(w)`:
//!
//! | Outcome                  | Total return             |
//! |--------------------------|--------------------------|
//! | no combo                 | `w − F`                  |
//! | `lose_wager`             | `0`                      |
//! | jackpot, fee not paid    | `w − F`                  |
//! | jackpot, fee paid        | `w·m + avg_jackpot − F`  |
//! | any other combo          | `w·m + fixed − F`        |
//!
//! The jackpot term uses the long-run average pool, not its current value.

use std::collections::BTreeMap;

use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use serde::Serialize;

use crate::config::{JACKPOT, LOSE_WAGER, ReelConfiguration, ReelId};
use crate::error::{SlotError, SlotResult};
use crate::fees::FeeTier;
use crate::piecewise::{Linear, Piece, PiecewiseReturn};
use crate::rational::{decimal_ratio, format_percent, frac, int, one, to_f64, zero};

/// `(any_lose, standard_lose)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LosingProbabilities {
    /// No combo, or a `lose_wager` combo
    pub any_lose: BigRational,
    /// No combo at all
    pub standard_lose: BigRational,
}

impl LosingProbabilities {
    /// Probability of any winning combo
    pub fn win(&self) -> BigRational {
        one() - &self.any_lose
    }
}

/// Expectation at one wager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedValue {
    pub expected_total_return: BigRational,
    pub expected_return: BigRational,
}

/// One row of an RTP report
#[derive(Debug, Clone, Serialize)]
pub struct RtpLine {
    pub wager: u64,
    pub tier: FeeTier,
    pub jackpot_fee_paid: bool,
    pub expected_total_return: f64,
    pub expected_return: f64,
    pub rtp: String,
}

/// Derived probabilities for one configuration snapshot
#[derive(Debug, Clone)]
pub struct ProbabilityEngine {
    config: ReelConfiguration,
    events: BTreeMap<String, BigRational>,
    losing: LosingProbabilities,
    average_jackpot: BigRational,
    expected: PiecewiseReturn,
}

impl ProbabilityEngine {
    /// Compute every derived quantity for `config`
    pub fn new(config: &ReelConfiguration) -> Self {
        let config = config.clone();

        let events: BTreeMap<String, BigRational> = config
            .reels
            .symbols()
            .into_iter()
            .map(|symbol| (symbol.to_string(), event_probability(&config, symbol)))
            .collect();

        let total: BigRational = events.values().fold(zero(), |acc, p| acc + p);
        let lose_wager = events.get(LOSE_WAGER).cloned().unwrap_or_else(zero);
        let standard_lose = one() - &total;
        let losing = LosingProbabilities {
            any_lose: &standard_lose + &lose_wager,
            standard_lose,
        };

        let p_jackpot = events.get(JACKPOT).cloned().unwrap_or_else(zero);
        let average_jackpot = average_jackpot(config.jackpot_seed(), &p_jackpot);

        let mut engine = Self {
            config,
            events,
            losing,
            average_jackpot,
            expected: PiecewiseReturn::new(Vec::new()),
        };
        engine.expected = engine.build_expected_return();

        log::debug!(
            "Probability engine ready: {} event(s), standard lose {}",
            engine.events.len(),
            format_percent(&engine.losing.standard_lose)
        );
        engine
    }

    pub fn config(&self) -> &ReelConfiguration {
        &self.config
    }

    /// `count(symbol, reel) / total_weight(reel)`, zero if absent
    pub fn symbol_probability(&self, reel: ReelId, symbol: &str) -> BigRational {
        symbol_probability(&self.config, reel, symbol)
    }

    /// Probability that all three reels show `symbol`
    pub fn event_probability(&self, symbol: &str) -> BigRational {
        self.events.get(symbol).cloned().unwrap_or_else(zero)
    }

    /// Every combo event with its probability
    pub fn event_probabilities(&self) -> &BTreeMap<String, BigRational> {
        &self.events
    }

    pub fn losing_probabilities(&self) -> &LosingProbabilities {
        &self.losing
    }

    /// Long-run average pool for the configured seed
    pub fn average_jackpot(&self) -> &BigRational {
        &self.average_jackpot
    }

    /// The full piecewise expected-total-return function
    pub fn expected_return_function(&self) -> &PiecewiseReturn {
        &self.expected
    }

    pub fn expected_value(&self, wager: u64) -> SlotResult<ExpectedValue> {
        let expected_total_return = self
            .expected
            .expected_total_return(wager)
            .ok_or(SlotError::InvalidWager(wager))?;
        let expected_return = &expected_total_return - int(wager);
        Ok(ExpectedValue {
            expected_total_return,
            expected_return,
        })
    }

    /// Expected total return divided by the wager
    pub fn rtp(&self, wager: u64) -> SlotResult<BigRational> {
        let ev = self.expected_value(wager)?;
        Ok(ev.expected_total_return / int(wager))
    }

    /// RTP rendered as `"96.5000%"`, `"~96.5231%"` or `"<0.0001%"`
    pub fn calculate_rtp(&self, wager: u64) -> SlotResult<String> {
        Ok(format_percent(&self.rtp(wager)?))
    }

    /// One line per wager for display
    pub fn report(&self, wagers: &[u64]) -> SlotResult<Vec<RtpLine>> {
        wagers
            .iter()
            .map(|&wager| -> SlotResult<RtpLine> {
                let ev = self.expected_value(wager)?;
                Ok(RtpLine {
                    wager,
                    tier: FeeTier::for_wager(wager),
                    jackpot_fee_paid: self.config.fees.jackpot_fee_paid(wager),
                    expected_total_return: to_f64(&ev.expected_total_return),
                    expected_return: to_f64(&ev.expected_return),
                    rtp: self.calculate_rtp(wager)?,
                })
            })
            .collect()
    }

    fn build_expected_return(&self) -> PiecewiseReturn {
        let threshold = self.jackpot_threshold_wager();
        let mut pieces = Vec::new();

        for tier in FeeTier::ALL {
            let (start, end) = tier.range();
            if self.config.fees.tier(tier).jackpot.is_zero() || end.is_some_and(|e| threshold > e) {
                pieces.push(self.piece(tier, start, end, false));
            } else if threshold <= start {
                pieces.push(self.piece(tier, start, end, true));
            } else {
                pieces.push(self.piece(tier, start, Some(threshold - 1), false));
                pieces.push(self.piece(tier, threshold, end, true));
            }
        }
        PiecewiseReturn::new(pieces)
    }

    /// First whole wager at or above the jackpot threshold
    fn jackpot_threshold_wager(&self) -> u64 {
        let threshold = self.config.fees.jackpot_threshold();
        if !threshold.is_positive() {
            return 0;
        }
        threshold.ceil().to_integer().to_u64().unwrap_or(u64::MAX)
    }

    fn piece(&self, tier: FeeTier, start: u64, end: Option<u64>, jackpot_fee_paid: bool) -> Piece {
        let fees = self.config.fees.charged_linear(tier, jackpot_fee_paid);
        let standard = Linear::wager() - fees.clone();

        let mut total = standard.clone() * &self.losing.standard_lose;
        for (symbol, probability) in &self.events {
            if probability.is_zero() {
                continue;
            }
            let outcome = match symbol.as_str() {
                LOSE_WAGER => Linear::zero(),
                JACKPOT if !jackpot_fee_paid => standard.clone(),
                JACKPOT => self.combo_return(symbol, self.average_jackpot.clone()) - fees.clone(),
                _ => {
                    let fixed = self.combo_fixed(symbol);
                    self.combo_return(symbol, fixed) - fees.clone()
                }
            };
            total = total + outcome * probability;
        }

        Piece {
            start,
            end,
            tier,
            jackpot_fee_paid,
            expected_total_return: total,
        }
    }

    /// `w·multiplier + amount` for a combo, before fees
    fn combo_return(&self, symbol: &str, amount: BigRational) -> Linear {
        let multiplier = self
            .config
            .combo_events
            .get(symbol)
            .and_then(|e| decimal_ratio(e.wager_multiplier))
            .unwrap_or_else(zero);
        Linear::new(multiplier, amount)
    }

    fn combo_fixed(&self, symbol: &str) -> BigRational {
        self.config
            .combo_events
            .get(symbol)
            .map(|e| int(e.fixed_amount))
            .unwrap_or_else(zero)
    }
}

fn symbol_probability(config: &ReelConfiguration, reel: ReelId, symbol: &str) -> BigRational {
    let total = config.reels.total_weight(reel);
    match config.reels.get(reel).get(symbol) {
        Some(&count) if total > 0 => BigRational::new(count.into(), total.into()),
        _ => zero(),
    }
}

fn event_probability(config: &ReelConfiguration, symbol: &str) -> BigRational {
    ReelId::ALL
        .iter()
        .fold(one(), |acc, &reel| acc * symbol_probability(config, reel, symbol))
}

/// `seed + (1 / p) / 2`: midpoint of the pool's ramp between wins.
/// With `p = 0` the pool never resets, so the seed is returned.
pub fn average_jackpot(seed: u64, p_jackpot: &BigRational) -> BigRational {
    if p_jackpot.is_zero() {
        return int(seed);
    }
    int(seed) + p_jackpot.recip() * frac(1, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComboEvent, Reels};
    use crate::fees::FeeSchedule;

    fn toy_config() -> ReelConfiguration {
        let mut combo_events = BTreeMap::new();
        combo_events.insert(LOSE_WAGER.to_string(), ComboEvent::lose_wager());
        combo_events.insert("small_win".to_string(), ComboEvent::new(3, 1.0));
        combo_events.insert(JACKPOT.to_string(), ComboEvent::new(100, 1.0));
        let stops = [(LOSE_WAGER, 2), ("small_win", 8), (JACKPOT, 1)]
            .into_iter()
            .map(|(s, n)| (s.to_string(), n))
            .collect();
        ReelConfiguration {
            combo_events,
            reels: Reels::uniform(stops),
            fees: FeeSchedule::default(),
            jackpot_pool: 100,
            new_bonus_wait_seconds: 30,
            starting_bonus_die_enabled: false,
        }
    }

    #[test]
    fn test_symbol_and_event_probability() {
        let engine = ProbabilityEngine::new(&toy_config());
        assert_eq!(engine.symbol_probability(ReelId::Reel2, "small_win"), frac(8, 11));
        assert_eq!(engine.symbol_probability(ReelId::Reel2, "cherry"), zero());
        assert_eq!(engine.event_probability(JACKPOT), frac(1, 1331));
        assert_eq!(engine.event_probability("small_win"), frac(512, 1331));
        assert_eq!(engine.event_probability(LOSE_WAGER), frac(8, 1331));
    }

    #[test]
    fn test_losing_probabilities() {
        let engine = ProbabilityEngine::new(&toy_config());
        let losing = engine.losing_probabilities();
        assert_eq!(losing.standard_lose, frac(810, 1331));
        assert_eq!(losing.any_lose, frac(818, 1331));
        assert_eq!(losing.win(), frac(513, 1331));
    }

    #[test]
    fn test_average_jackpot() {
        assert_eq!(average_jackpot(100, &frac(1, 1331)), frac(1531, 2));
        assert_eq!(average_jackpot(100, &zero()), int(100));
    }

    #[test]
    fn test_expected_value_lowest_tier() {
        let engine = ProbabilityEngine::new(&toy_config());
        let ev = engine.expected_value(1).unwrap();
        // only small_win returns anything: 1 + 3 - 1 = 3
        assert_eq!(ev.expected_total_return, frac(1536, 1331));
        assert_eq!(ev.expected_return, frac(205, 1331));
    }

    #[test]
    fn test_pieces_split_at_jackpot_threshold() {
        let engine = ProbabilityEngine::new(&toy_config());
        let pieces = engine.expected_return_function().pieces();
        assert_eq!(pieces.len(), 4);
        assert!(!pieces[0].jackpot_fee_paid);
        assert!(pieces[1..].iter().all(|p| p.jackpot_fee_paid));
        assert_eq!(pieces[3].end, None);
    }

    #[test]
    fn test_zero_wager_rejected() {
        let engine = ProbabilityEngine::new(&toy_config());
        assert!(matches!(engine.rtp(0), Err(SlotError::InvalidWager(0))));
    }

    #[test]
    fn test_report() {
        let engine = ProbabilityEngine::new(&toy_config());
        let report = engine.report(&[1, 1000]).unwrap();
        assert_eq!(report[0].tier, FeeTier::Lowest);
        assert_eq!(report[0].rtp, "~115.4020%");
        assert!(report[1].jackpot_fee_paid);
        assert_eq!(report[1].rtp, "~97.0869%");
    }
}
