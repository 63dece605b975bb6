//! Play resolution
//!
//! A play moves through `Spinning → Settling → Settled`:
//!
//! - **Spinning**: each reel is drawn independently, weighted by its stop
//!   counts. Reels can be stopped one at a time.
//! - **Settling**: all three symbols are known; the combo, fee tier and
//!   jackpot eligibility are decided.
//! - **Settled**: the [`SpinOutcome`] carries the total and net return and
//!   the jackpot pool has been updated.
//!
//! Drawn symbols are committed. There is no way back from `Spinning`.

use std::collections::VecDeque;
use std::fmt;

use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ComboEvent, JACKPOT, LOSE_WAGER, ReelConfiguration, ReelId, ReelStops};
use crate::error::{ConfigError, SlotError, SlotResult};
use crate::fees::FeeTier;
use crate::rational::{decimal_ratio, int, round_coins, to_f64, zero};

// ═══════════════════════════════════════════════════════════════════════════
// SYMBOL SOURCES
// ═══════════════════════════════════════════════════════════════════════════

/// Where reel symbols come from
pub trait SymbolSource: Send {
    /// Draw one symbol from `stops`; `None` if nothing can be drawn
    fn draw(&mut self, reel: ReelId, stops: &ReelStops) -> Option<String>;
}

/// Weighted random draws
pub struct RandomSymbols<R: Rng = StdRng> {
    rng: R,
}

impl RandomSymbols<StdRng> {
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible draws
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RandomSymbols<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> SymbolSource for RandomSymbols<R> {
    fn draw(&mut self, _reel: ReelId, stops: &ReelStops) -> Option<String> {
        let total: u64 = stops.values().sum();
        if total == 0 {
            return None;
        }
        let mut roll = self.rng.random_range(0..total);
        for (symbol, &weight) in stops {
            if roll < weight {
                return Some(symbol.clone());
            }
            roll -= weight;
        }
        None
    }
}

/// Predetermined symbols, consumed in order
#[derive(Debug, Clone, Default)]
pub struct ScriptedSymbols {
    queue: VecDeque<String>,
}

impl ScriptedSymbols {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            queue: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl SymbolSource for ScriptedSymbols {
    fn draw(&mut self, _reel: ReelId, _stops: &ReelStops) -> Option<String> {
        self.queue.pop_front()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PLAY
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle of a single play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinPhase {
    Spinning,
    Settling,
    Settled,
}

/// A play in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Play {
    wager: u64,
    reels: [Option<String>; 3],
}

impl Play {
    pub fn new(wager: u64) -> SlotResult<Self> {
        if wager == 0 {
            return Err(SlotError::InvalidWager(wager));
        }
        Ok(Self {
            wager,
            reels: [None, None, None],
        })
    }

    pub fn wager(&self) -> u64 {
        self.wager
    }

    pub fn phase(&self) -> SpinPhase {
        if self.is_complete() {
            SpinPhase::Settling
        } else {
            SpinPhase::Spinning
        }
    }

    /// Symbols stopped so far, in reel order
    pub fn drawn(&self) -> Vec<&str> {
        self.reels.iter().map_while(|s| s.as_deref()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.reels.iter().all(Option::is_some)
    }

    /// Next reel still spinning
    pub fn next_reel(&self) -> Option<ReelId> {
        self.reels
            .iter()
            .position(Option::is_none)
            .map(|i| ReelId::ALL[i])
    }

    /// Stop the next reel. Returns the reel and its symbol, or `None` when
    /// all reels are already stopped.
    pub fn draw_next(
        &mut self,
        config: &ReelConfiguration,
        source: &mut dyn SymbolSource,
    ) -> SlotResult<Option<(ReelId, String)>> {
        let Some(reel) = self.next_reel() else {
            return Ok(None);
        };
        let stops = config.reels.get(reel);
        let symbol = source.draw(reel, stops).ok_or(SlotError::NoSymbol(reel.name()))?;
        if !stops.get(&symbol).is_some_and(|&n| n > 0) {
            return Err(SlotError::UnknownSymbol {
                reel: reel.name(),
                symbol,
            });
        }
        self.reels[reel as usize] = Some(symbol.clone());
        Ok(Some((reel, symbol)))
    }

    /// Stop every remaining reel
    pub fn draw_all(&mut self, config: &ReelConfiguration, source: &mut dyn SymbolSource) -> SlotResult<()> {
        while self.draw_next(config, source)?.is_some() {}
        Ok(())
    }

    fn symbols(&self) -> SlotResult<[String; 3]> {
        match &self.reels {
            [Some(a), Some(b), Some(c)] => Ok([a.clone(), b.clone(), c.clone()]),
            _ => Err(SlotError::Incomplete {
                drawn: self.drawn().len(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════

/// How a play ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Symbols differ: only the fees are lost
    NoCombo,
    /// Three `lose_wager`: the whole wager is lost, no fees
    LoseWager,
    /// Three jackpots without the jackpot fee: same as no combo
    JackpotFail,
    /// Three jackpots with the fee paid: the pool is won
    Jackpot,
    /// Any other combo
    Win,
}

impl OutcomeKind {
    pub fn name(self) -> &'static str {
        match self {
            OutcomeKind::NoCombo => "no_combo",
            OutcomeKind::LoseWager => "lose_wager",
            OutcomeKind::JackpotFail => "jackpot_fail",
            OutcomeKind::Jackpot => "jackpot",
            OutcomeKind::Win => "win",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settled play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub wager: u64,
    /// Symbol per reel
    pub symbols: [String; 3],
    /// Matched symbol, if all three agree
    pub combo: Option<String>,
    pub kind: OutcomeKind,
    pub tier: FeeTier,
    pub jackpot_fee_paid: bool,
    /// Fees charged (exact value, for display)
    pub fees: f64,
    /// Everything handed back, including the wager when kept
    pub total_return: u64,
    /// `total_return - wager`
    pub net_return: i64,
    /// Pool after this play
    pub jackpot_pool: u64,
}

impl SpinOutcome {
    pub fn phase(&self) -> SpinPhase {
        SpinPhase::Settled
    }

    pub fn is_win(&self) -> bool {
        self.net_return > 0
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════

/// Settles plays against a configuration, updating its jackpot pool
pub struct SpinResolver<'a> {
    config: &'a mut ReelConfiguration,
}

impl<'a> SpinResolver<'a> {
    pub fn new(config: &'a mut ReelConfiguration) -> Self {
        Self { config }
    }

    /// Draw all three reels and settle
    pub fn resolve(&mut self, wager: u64, source: &mut dyn SymbolSource) -> SlotResult<SpinOutcome> {
        let mut play = Play::new(wager)?;
        play.draw_all(&*self.config, source)?;
        self.settle(play)
    }

    /// Settle a fully drawn play
    pub fn settle(&mut self, play: Play) -> SlotResult<SpinOutcome> {
        let symbols = play.symbols()?;
        let wager = play.wager;
        let fees = &self.config.fees;

        let combo = (symbols[0] == symbols[1] && symbols[1] == symbols[2]).then(|| symbols[0].clone());
        let tier = FeeTier::for_wager(wager);
        let jackpot_fee_paid = fees.jackpot_fee_paid(wager);
        let charged = fees.charged(wager);
        let kept = int(wager) - &charged;

        let (kind, total) = match combo.as_deref() {
            None => (OutcomeKind::NoCombo, kept),
            Some(LOSE_WAGER) => (OutcomeKind::LoseWager, zero()),
            Some(JACKPOT) if !jackpot_fee_paid => (OutcomeKind::JackpotFail, kept),
            Some(JACKPOT) => {
                let pool = int(self.config.jackpot_pool);
                (OutcomeKind::Jackpot, self.combo_gross(JACKPOT, wager, pool)? - &charged)
            }
            Some(symbol) => {
                let fixed = int(self.combo_event(symbol)?.fixed_amount);
                (OutcomeKind::Win, self.combo_gross(symbol, wager, fixed)? - &charged)
            }
        };

        let total_return = settle_coins(&total);
        let net_return = (i128::from(total_return) - i128::from(wager))
            .clamp(i64::MIN.into(), i64::MAX.into()) as i64;

        if kind == OutcomeKind::Jackpot {
            self.config.jackpot_pool = self.config.jackpot_seed();
            log::info!("Jackpot won at wager {}: {} coin(s)", wager, total_return);
        } else {
            self.config.jackpot_pool = self.config.jackpot_pool.saturating_add(1);
        }
        self.config.clamp_jackpot();

        log::debug!(
            "Settled {:?} as {} (wager {}, total {}, net {})",
            symbols,
            kind,
            wager,
            total_return,
            net_return
        );

        Ok(SpinOutcome {
            wager,
            symbols,
            combo,
            kind,
            tier,
            jackpot_fee_paid,
            fees: if kind == OutcomeKind::LoseWager { 0.0 } else { to_f64(&charged) },
            total_return,
            net_return,
            jackpot_pool: self.config.jackpot_pool,
        })
    }

    fn combo_event(&self, symbol: &str) -> SlotResult<&ComboEvent> {
        self.config
            .combo_events
            .get(symbol)
            .ok_or_else(|| ConfigError::MissingComboEvent(symbol.to_string()).into())
    }

    /// `wager · multiplier + amount`
    fn combo_gross(&self, symbol: &str, wager: u64, amount: BigRational) -> SlotResult<BigRational> {
        let event = self.combo_event(symbol)?;
        let multiplier = decimal_ratio(event.wager_multiplier).ok_or_else(|| ConfigError::InvalidComboEvent {
            symbol: symbol.to_string(),
            reason: format!("multiplier {} is not finite", event.wager_multiplier),
        })?;
        Ok(multiplier * int(wager) + amount)
    }
}

/// Clamp at zero and round to whole coins
fn settle_coins(total: &BigRational) -> u64 {
    if total.is_negative() {
        return 0;
    }
    round_coins(total).to_u64().unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReelConfiguration {
        let mut config = ReelConfiguration::template();
        config.combo_events.insert("small_win".to_string(), ComboEvent::new(3, 1.0));
        config
    }

    fn settle(config: &mut ReelConfiguration, wager: u64, symbols: [&str; 3]) -> SpinOutcome {
        let mut source = ScriptedSymbols::new(symbols);
        SpinResolver::new(config).resolve(wager, &mut source).unwrap()
    }

    #[test]
    fn test_weighted_draw_respects_stops() {
        let mut stops = ReelStops::new();
        stops.insert("only".to_string(), 5);
        let mut source = RandomSymbols::seeded(7);
        for _ in 0..20 {
            assert_eq!(source.draw(ReelId::Reel1, &stops).as_deref(), Some("only"));
        }
        assert_eq!(source.draw(ReelId::Reel1, &ReelStops::new()), None);
    }

    #[test]
    fn test_weighted_draw_frequencies() {
        let mut stops = ReelStops::new();
        stops.insert("a".to_string(), 1);
        stops.insert("b".to_string(), 3);
        let mut source = RandomSymbols::seeded(42);
        let b = (0..4000)
            .filter(|_| source.draw(ReelId::Reel1, &stops).as_deref() == Some("b"))
            .count();
        assert!((2800..3200).contains(&b), "b drawn {b} times");
    }

    #[test]
    fn test_phases() {
        let config = config();
        let mut play = Play::new(5).unwrap();
        let mut source = ScriptedSymbols::new(["small_win", "high_win", "jackpot"]);
        assert_eq!(play.phase(), SpinPhase::Spinning);

        let (reel, symbol) = play.draw_next(&config, &mut source).unwrap().unwrap();
        assert_eq!(reel, ReelId::Reel1);
        assert_eq!(symbol, "small_win");
        assert_eq!(play.drawn(), vec!["small_win"]);

        play.draw_all(&config, &mut source).unwrap();
        assert_eq!(play.phase(), SpinPhase::Settling);
        assert!(play.draw_next(&config, &mut source).unwrap().is_none());
    }

    #[test]
    fn test_incomplete_play_cannot_settle() {
        let mut config = config();
        let play = Play::new(5).unwrap();
        let err = SpinResolver::new(&mut config).settle(play).unwrap_err();
        assert!(matches!(err, SlotError::Incomplete { drawn: 0 }));
    }

    #[test]
    fn test_zero_wager_rejected() {
        assert!(matches!(Play::new(0), Err(SlotError::InvalidWager(0))));
    }

    #[test]
    fn test_no_combo_loses_only_fees() {
        let mut config = config();
        let outcome = settle(&mut config, 5, ["small_win", "jackpot", "high_win"]);
        assert_eq!(outcome.kind, OutcomeKind::NoCombo);
        assert_eq!(outcome.combo, None);
        assert_eq!(outcome.total_return, 3);
        assert_eq!(outcome.net_return, -2);
    }

    #[test]
    fn test_lose_wager_skips_fees() {
        let mut config = config();
        let outcome = settle(&mut config, 50, [LOSE_WAGER; 3]);
        assert_eq!(outcome.kind, OutcomeKind::LoseWager);
        assert_eq!(outcome.total_return, 0);
        assert_eq!(outcome.net_return, -50);
    }

    #[test]
    fn test_win_pays_multiplier_and_fixed() {
        let mut config = config();
        // 10·1.0 + 3 - (0.5 + 0.1) = 12.4 → 12
        let outcome = settle(&mut config, 10, ["small_win"; 3]);
        assert_eq!(outcome.kind, OutcomeKind::Win);
        assert_eq!(outcome.total_return, 12);
        assert_eq!(outcome.net_return, 2);
        assert!(outcome.is_win());
    }

    #[test]
    fn test_jackpot_fail_below_threshold() {
        let mut config = config();
        let pool = config.jackpot_pool;
        let outcome = settle(&mut config, 1, [JACKPOT; 3]);
        assert_eq!(outcome.kind, OutcomeKind::JackpotFail);
        assert!(!outcome.jackpot_fee_paid);
        assert_eq!(outcome.net_return, -1);
        assert_eq!(config.jackpot_pool, pool + 1);
    }

    #[test]
    fn test_jackpot_pays_pool_and_resets() {
        let mut config = config();
        config.jackpot_pool = 1500;
        // 2·1.0 + 1500 - 2
        let outcome = settle(&mut config, 2, [JACKPOT; 3]);
        assert_eq!(outcome.kind, OutcomeKind::Jackpot);
        assert_eq!(outcome.total_return, 1500);
        assert_eq!(outcome.net_return, 1498);
        assert_eq!(config.jackpot_pool, config.jackpot_seed());
        assert_eq!(outcome.jackpot_pool, 1000);
    }

    #[test]
    fn test_negative_total_clamps_to_zero() {
        let mut config = config();
        config.combo_events.insert("small_win".to_string(), ComboEvent::new(0, -3.0));
        let outcome = settle(&mut config, 5, ["small_win"; 3]);
        assert_eq!(outcome.total_return, 0);
        assert_eq!(outcome.net_return, -5);
    }

    #[test]
    fn test_symbol_off_reel_rejected() {
        let mut config = config();
        let pool = config.jackpot_pool;
        let mut source = ScriptedSymbols::new(["ghost"; 3]);
        let err = SpinResolver::new(&mut config).resolve(10, &mut source).unwrap_err();
        assert!(matches!(
            err,
            SlotError::UnknownSymbol { reel: "reel1", ref symbol } if symbol == "ghost"
        ));
        assert_eq!(config.jackpot_pool, pool);
    }

    #[test]
    fn test_combo_without_event_rejected() {
        let mut config = config();
        for reel in ReelId::ALL {
            config.add_symbol_count(reel, "cherry", 2);
        }
        let pool = config.jackpot_pool;
        let mut source = ScriptedSymbols::new(["cherry"; 3]);
        let err = SpinResolver::new(&mut config).resolve(10, &mut source).unwrap_err();
        assert!(matches!(
            err,
            SlotError::Config(ConfigError::MissingComboEvent(ref symbol)) if symbol == "cherry"
        ));
        assert_eq!(config.jackpot_pool, pool);
    }

    #[test]
    fn test_exhausted_source() {
        let mut config = config();
        let mut source = ScriptedSymbols::new(["small_win"]);
        let err = SpinResolver::new(&mut config).resolve(3, &mut source).unwrap_err();
        assert!(matches!(err, SlotError::NoSymbol("reel2")));
    }
}
