//! Application context
//!
//! Built once at start-up and handed to every component that needs the
//! ledger or the slot machine. Each subsystem keeps its own state; the
//! context only wires them together and exposes the operations front ends
//! call.

use std::fs;
use std::time::Duration;

use cs_ledger::{Block, BlockData, HashChain, Transaction, TransactionLog, identity_digest};
use cs_slot::{RandomSymbols, SlotMachine, SpinOutcome};

use crate::error::{CasinoError, CasinoResult};
use crate::plays::PlayRegistry;
use crate::settings::CasinoSettings;

/// Why a transfer between players was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRejection {
    /// Zero coins, or sender and receiver are the same identity
    InvalidAmount,
    /// The sender has never appeared in the ledger
    UnknownSender,
    InsufficientFunds { balance: i64, amount: u64 },
    /// The sender has a play in flight
    SenderBusy,
}

/// Ledger, slot machine and play registry
pub struct CasinoContext {
    settings: CasinoSettings,
    chain: HashChain,
    machine: SlotMachine,
    plays: PlayRegistry,
    house: String,
}

impl CasinoContext {
    /// Open (or create) every data file under `settings.data_dir`
    pub fn open(settings: CasinoSettings) -> CasinoResult<Self> {
        fs::create_dir_all(&settings.data_dir)?;

        let chain = HashChain::open(settings.ledger_path())?
            .with_transaction_log(TransactionLog::new(settings.transactions_path()));
        let machine = SlotMachine::load_or_init(settings.reels_path())?;
        let house = settings.house_digest();

        log::info!(
            "Casino opened at {} ({} block(s))",
            settings.data_dir.display(),
            chain.len()?
        );

        Ok(Self {
            settings,
            chain,
            machine,
            plays: PlayRegistry::new(),
            house,
        })
    }

    pub fn settings(&self) -> &CasinoSettings {
        &self.settings
    }

    pub fn chain(&self) -> &HashChain {
        &self.chain
    }

    pub fn machine(&self) -> &SlotMachine {
        &self.machine
    }

    pub fn plays(&self) -> &PlayRegistry {
        &self.plays
    }

    /// House identity digest
    pub fn house(&self) -> &str {
        &self.house
    }

    /// How long a front end waits before rolling the starting bonus die
    pub fn bonus_wait(&self) -> Duration {
        Duration::from_secs(self.machine.config().new_bonus_wait_seconds)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CORE API
    // ═══════════════════════════════════════════════════════════════════════

    /// Record one transfer in the ledger
    pub fn add_block_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: u64,
        method: &str,
    ) -> CasinoResult<Block> {
        let block = self.chain.add_block(
            BlockData::transaction(Transaction::new(sender, receiver, amount, method)),
            self.settings.proof_of_work_difficulty,
        )?;
        log::debug!("Block {} recorded ({} via {})", block.index, amount, method);
        Ok(block)
    }

    /// Replayed balance, `None` for an identity never seen
    pub fn get_balance(&self, digest: &str) -> CasinoResult<Option<i64>> {
        Ok(self.chain.get_balance(digest)?)
    }

    pub fn get_last_block_timestamp(&self) -> CasinoResult<Option<f64>> {
        Ok(self.chain.get_last_block_timestamp()?)
    }

    /// Draw and settle a play without moving any coins
    pub fn resolve_spin(&self, wager: u64) -> CasinoResult<SpinOutcome> {
        let mut source = RandomSymbols::from_os_rng();
        Ok(self.machine.resolve_spin(wager, &mut source)?)
    }

    /// RTP at `wager` as `"96.5231%"`-style text
    pub fn calculate_rtp(&self, wager: u64) -> CasinoResult<String> {
        Ok(self.machine.calculate_rtp(wager)?)
    }

    pub fn is_chain_valid(&self) -> CasinoResult<bool> {
        Ok(self.chain.is_chain_valid()?)
    }

    /// `Err(ChainInvalid)` unless every block verifies
    pub fn ensure_chain_valid(&self) -> CasinoResult<()> {
        match self.chain.verify()? {
            None => Ok(()),
            Some(fault) => {
                log::error!("Chain integrity violation: {}", fault);
                Err(CasinoError::ChainInvalid(fault))
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSFERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Move coins between two players, by user id
    pub fn transfer(
        &self,
        from_user: &str,
        to_user: &str,
        amount: u64,
    ) -> CasinoResult<Result<Block, TransferRejection>> {
        let sender = identity_digest(from_user);
        let receiver = identity_digest(to_user);
        if amount == 0 || sender == receiver {
            return Ok(Err(TransferRejection::InvalidAmount));
        }

        let Some(_guard) = self.plays.reserve(&sender, self.settings.play_wait()) else {
            return Ok(Err(TransferRejection::SenderBusy));
        };

        let balance = match self.get_balance(&sender)? {
            None => return Ok(Err(TransferRejection::UnknownSender)),
            Some(balance) => balance,
        };
        if balance < 0 || (balance as u64) < amount {
            return Ok(Err(TransferRejection::InsufficientFunds { balance, amount }));
        }

        let block = self.add_block_transaction(&sender, &receiver, amount, "transfer")?;
        Ok(Ok(block))
    }
}
