//! Slot machine
//!
//! Owns the reel configuration file and the probability engine derived from
//! it. Every mutation validates, writes the file back and drops the cached
//! engine, so the next RTP query or settled play sees fresh probabilities.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{ComboEvent, ReelConfiguration, ReelId};
use crate::error::{SlotError, SlotResult};
use crate::fees::{FeeAmount, FeeKind, FeeTier};
use crate::probability::ProbabilityEngine;
use crate::spin::{Play, SpinOutcome, SpinResolver, SymbolSource};

/// Reel configuration plus derived probabilities, safe to share across threads
pub struct SlotMachine {
    path: PathBuf,
    config: RwLock<ReelConfiguration>,
    engine: RwLock<Option<Arc<ProbabilityEngine>>>,
}

impl SlotMachine {
    /// Load and validate an existing configuration file
    pub fn load(path: impl Into<PathBuf>) -> SlotResult<Self> {
        let path = path.into();
        let config = ReelConfiguration::load(&path)?;
        log::info!("Loaded reel configuration from {}", path.display());
        Ok(Self::with_config(path, config))
    }

    /// Load the configuration, writing a fresh template and retrying once if
    /// it is missing or invalid
    pub fn load_or_init(path: impl Into<PathBuf>) -> SlotResult<Self> {
        let path = path.into();
        match ReelConfiguration::load(&path) {
            Ok(config) => Ok(Self::with_config(path, config)),
            Err(e) => {
                log::warn!(
                    "Reel configuration {} unusable ({}), writing template",
                    path.display(),
                    e
                );
                ReelConfiguration::template().save(&path)?;
                let config = ReelConfiguration::load(&path)?;
                Ok(Self::with_config(path, config))
            }
        }
    }

    /// In-memory machine bound to `path` for later writes
    pub fn with_config(path: impl Into<PathBuf>, config: ReelConfiguration) -> Self {
        Self {
            path: path.into(),
            config: RwLock::new(config),
            engine: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current configuration
    pub fn config(&self) -> ReelConfiguration {
        self.config.read().clone()
    }

    pub fn jackpot_pool(&self) -> u64 {
        self.config.read().jackpot_pool
    }

    /// Re-read the file from disk
    pub fn reload(&self) -> SlotResult<()> {
        let fresh = ReelConfiguration::load(&self.path)?;
        let mut config = self.config.write();
        *config = fresh;
        self.invalidate();
        drop(config);
        log::info!("Reloaded reel configuration from {}", self.path.display());
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROBABILITIES
    // ═══════════════════════════════════════════════════════════════════════

    /// Probability engine for the current configuration, built on first use
    pub fn engine(&self) -> Arc<ProbabilityEngine> {
        let config = self.config.read();
        if let Some(engine) = self.engine.read().as_ref() {
            return Arc::clone(engine);
        }
        let mut slot = self.engine.write();
        if let Some(engine) = slot.as_ref() {
            return Arc::clone(engine);
        }
        let engine = Arc::new(ProbabilityEngine::new(&config));
        *slot = Some(Arc::clone(&engine));
        engine
    }

    /// RTP at `wager` as a percentage string
    pub fn calculate_rtp(&self, wager: u64) -> SlotResult<String> {
        self.engine().calculate_rtp(wager)
    }

    /// Callers hold the configuration write lock
    fn invalidate(&self) {
        *self.engine.write() = None;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ADMINISTRATION
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_symbol_count(&self, reel: ReelId, symbol: &str, count: u64) -> SlotResult<()> {
        self.mutate(|config| {
            config.add_symbol_count(reel, symbol, count);
            Ok(())
        })?;
        log::info!("Added {} stop(s) of {} to {}", count, symbol, reel);
        Ok(())
    }

    pub fn remove_symbol_count(&self, reel: ReelId, symbol: &str, count: u64) -> SlotResult<()> {
        self.mutate(|config| config.remove_symbol_count(reel, symbol, count))?;
        log::info!("Removed {} stop(s) of {} from {}", count, symbol, reel);
        Ok(())
    }

    pub fn set_fee(&self, tier: FeeTier, kind: FeeKind, amount: FeeAmount) -> SlotResult<()> {
        self.mutate(|config| {
            config.set_fee(tier, kind, amount);
            Ok(())
        })?;
        log::info!("Set {} {} fee to {}", tier, kind.name(), amount);
        Ok(())
    }

    pub fn set_combo_event(&self, symbol: &str, event: ComboEvent) -> SlotResult<()> {
        self.mutate(|config| {
            config.combo_events.insert(symbol.to_string(), event);
            config.clamp_jackpot();
            Ok(())
        })?;
        log::info!("Set combo event {}", symbol);
        Ok(())
    }

    /// Apply `change` to a copy, validate and persist it, then swap it in
    fn mutate<F>(&self, change: F) -> SlotResult<()>
    where
        F: FnOnce(&mut ReelConfiguration) -> SlotResult<()>,
    {
        let mut config = self.config.write();
        let mut next = config.clone();
        change(&mut next)?;
        next.validate()?;
        next.save(&self.path)?;
        *config = next;
        self.invalidate();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PLAYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Start a play; reels are stopped with [`Self::draw_next`]
    pub fn begin(&self, wager: u64) -> SlotResult<Play> {
        Play::new(wager)
    }

    /// Stop the next reel of `play`
    pub fn draw_next(
        &self,
        play: &mut Play,
        source: &mut dyn SymbolSource,
    ) -> SlotResult<Option<(ReelId, String)>> {
        play.draw_next(&self.config.read(), source)
    }

    /// Stop any remaining reels and settle. The updated jackpot pool is
    /// written back before the outcome is returned.
    pub fn finish(&self, play: Play, source: &mut dyn SymbolSource) -> SlotResult<SpinOutcome> {
        self.finish_with(play, source, |_| Ok::<_, SlotError>(()))
            .map(|(outcome, ())| outcome)
    }

    /// Settle `play` against a pending copy of the configuration and hand
    /// the outcome to `record`. The pending pool is committed only when
    /// `record` succeeds; on failure the play is left unresolved and the
    /// pool untouched.
    ///
    /// The configuration stays write-locked until the commit, so no other
    /// play can settle against the old pool in between.
    pub fn finish_with<T, E, F>(
        &self,
        mut play: Play,
        source: &mut dyn SymbolSource,
        record: F,
    ) -> Result<(SpinOutcome, T), E>
    where
        F: FnOnce(&SpinOutcome) -> Result<T, E>,
        E: From<SlotError>,
    {
        let mut config = self.config.write();
        play.draw_all(&config, source)?;

        let mut next = config.clone();
        let outcome = SpinResolver::new(&mut next).settle(play)?;
        let recorded = record(&outcome)?;

        *config = next;
        config.save(&self.path)?;
        Ok((outcome, recorded))
    }

    /// Draw all three reels and settle in one step
    pub fn resolve_spin(&self, wager: u64, source: &mut dyn SymbolSource) -> SlotResult<SpinOutcome> {
        let play = self.begin(wager)?;
        self.finish(play, source)
    }
}

impl std::fmt::Debug for SlotMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotMachine")
            .field("path", &self.path)
            .field("jackpot_pool", &self.jackpot_pool())
            .finish()
    }
}
