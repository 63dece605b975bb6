//! Slot machine sessions
//!
//! Ties a play to the ledger:
//!
//! 1. reserve the player's identity (one play at a time)
//! 2. check the wager against the replayed balance
//! 3. stop reels one by one, or all at once
//! 4. settle, then record only the *net* amount, house → player on a
//!    gain or player → house on a loss
//!
//! An outcome is only reported after its ledger block is written. A play
//! left unfinished settles itself when dropped or once it times out; drawn
//! reels are never rolled back.

use std::time::{Duration, Instant};

use cs_ledger::{Transaction, identity_digest};
use cs_slot::{Play, ReelId, SpinOutcome, SymbolSource};

use crate::context::CasinoContext;
use crate::error::CasinoResult;
use crate::plays::PlayGuard;

/// Ledger method tag for slot settlements
pub const SLOT_METHOD: &str = "slot_machine";

/// Why a play did not start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayRejection {
    /// The identity still had a play in flight after the wait
    AlreadyPlaying,
    InsufficientFunds { balance: i64, wager: u64 },
    InvalidWager(u64),
    /// The identity has never appeared in the ledger
    NewIdentity,
}

/// A settled and recorded play
#[derive(Debug, Clone)]
pub struct PlayReport {
    pub outcome: SpinOutcome,
    /// Net transfer written to the ledger, `None` when net is zero
    pub transfer: Option<Transaction>,
    /// Ledger index of that transfer
    pub block_index: Option<u64>,
    /// Player balance after settlement
    pub balance: i64,
}

/// Entry point for plays against one casino
pub struct SlotMachineSession<'a> {
    ctx: &'a CasinoContext,
}

impl<'a> SlotMachineSession<'a> {
    pub fn new(ctx: &'a CasinoContext) -> Self {
        Self { ctx }
    }

    /// Reserve the player and open a play. Reels are stopped with
    /// [`ActivePlay::stop_next_reel`].
    pub fn start(
        &self,
        user_id: &str,
        wager: u64,
        source: Box<dyn SymbolSource>,
    ) -> CasinoResult<Result<ActivePlay<'a>, PlayRejection>> {
        if wager == 0 {
            return Ok(Err(PlayRejection::InvalidWager(wager)));
        }
        let digest = identity_digest(user_id);

        let Some(guard) = self.ctx.plays().reserve(&digest, self.ctx.settings().play_wait()) else {
            log::debug!("Play rejected: identity busy");
            return Ok(Err(PlayRejection::AlreadyPlaying));
        };

        let balance = match self.ctx.get_balance(&digest)? {
            None => return Ok(Err(PlayRejection::NewIdentity)),
            Some(balance) => balance,
        };
        if balance < 0 || (balance as u64) < wager {
            return Ok(Err(PlayRejection::InsufficientFunds { balance, wager }));
        }

        let play = self.ctx.machine().begin(wager)?;
        Ok(Ok(ActivePlay {
            ctx: self.ctx,
            digest,
            play,
            source,
            started: Instant::now(),
            timeout: self.ctx.settings().play_timeout(),
            settled: false,
            report: None,
            _guard: guard,
        }))
    }

    /// Start, stop every reel and settle in one call
    pub fn play(
        &self,
        user_id: &str,
        wager: u64,
        source: Box<dyn SymbolSource>,
    ) -> CasinoResult<Result<PlayReport, PlayRejection>> {
        match self.start(user_id, wager, source)? {
            Ok(active) => Ok(Ok(active.finish()?)),
            Err(rejection) => Ok(Err(rejection)),
        }
    }
}

/// A play whose reels are still being stopped
pub struct ActivePlay<'a> {
    ctx: &'a CasinoContext,
    digest: String,
    play: Play,
    source: Box<dyn SymbolSource>,
    started: Instant,
    timeout: Duration,
    settled: bool,
    report: Option<PlayReport>,
    // released after settlement, when the struct is dropped
    _guard: PlayGuard<'a>,
}

impl ActivePlay<'_> {
    pub fn wager(&self) -> u64 {
        self.play.wager()
    }

    /// Symbols stopped so far
    pub fn drawn(&self) -> Vec<&str> {
        self.play.drawn()
    }

    /// Stop the next reel; `None` once all three are stopped.
    ///
    /// Past the play timeout the remaining reels are drawn and the play
    /// settles at once; [`Self::finish`] then returns that report.
    pub fn stop_next_reel(&mut self) -> CasinoResult<Option<(ReelId, String)>> {
        if self.settled {
            return Ok(None);
        }
        if self.is_timed_out() {
            log::warn!("Play timed out with {} reel(s) stopped, settling", self.play.drawn().len());
            self.report = Some(self.settle()?);
            return Ok(None);
        }
        Ok(self
            .ctx
            .machine()
            .draw_next(&mut self.play, self.source.as_mut())?)
    }

    /// The player has been idle past the play timeout
    pub fn is_timed_out(&self) -> bool {
        self.started.elapsed() >= self.timeout
    }

    /// Stop any remaining reels, settle and record the net transfer
    pub fn finish(mut self) -> CasinoResult<PlayReport> {
        match self.report.take() {
            Some(report) => Ok(report),
            None => self.settle(),
        }
    }

    /// Report of a play that settled on timeout
    pub fn settled_report(&self) -> Option<&PlayReport> {
        self.report.as_ref()
    }

    fn settle(&mut self) -> CasinoResult<PlayReport> {
        self.settled = true;
        self.ctx.ensure_chain_valid()?;

        let ctx = self.ctx;
        let digest = self.digest.as_str();
        let (outcome, (transfer, block_index)) =
            ctx.machine()
                .finish_with(self.play.clone(), self.source.as_mut(), |outcome| record_net(ctx, digest, outcome))?;

        let balance = ctx.get_balance(&self.digest)?.unwrap_or(0);
        log::info!(
            "Play settled: {} at wager {}, net {}",
            outcome.kind,
            outcome.wager,
            outcome.net_return
        );

        Ok(PlayReport {
            outcome,
            transfer,
            block_index,
            balance,
        })
    }
}

/// Write the net amount of `outcome` to the ledger. The jackpot pool is
/// only committed once this succeeds.
fn record_net(
    ctx: &CasinoContext,
    digest: &str,
    outcome: &SpinOutcome,
) -> CasinoResult<(Option<Transaction>, Option<u64>)> {
    let house = ctx.house();
    let transfer = match outcome.net_return {
        0 => return Ok((None, None)),
        net if net > 0 => Transaction::new(house, digest, net.unsigned_abs(), SLOT_METHOD),
        net => Transaction::new(digest, house, net.unsigned_abs(), SLOT_METHOD),
    };
    let block = ctx
        .add_block_transaction(&transfer.sender, &transfer.receiver, transfer.amount, SLOT_METHOD)
        .inspect_err(|e| log::error!("Settled play could not be recorded: {}", e))?;
    Ok((Some(transfer), Some(block.index)))
}

impl Drop for ActivePlay<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        log::warn!("Play abandoned with {} reel(s) stopped, settling", self.play.drawn().len());
        if let Err(e) = self.settle() {
            log::error!("Abandoned play failed to settle: {}", e);
        }
    }
}
