//! Hash chain backed by an append-only JSON-lines file
//!
//! One block per line. Appends hold the write lock for the whole
//! read-last/construct/write cycle, so two appends can never claim the same
//! index or predecessor. Readers share the read lock and never observe a
//! half-written record.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::block::{Block, BlockData, GENESIS_PREVIOUS_HASH, Transaction};
use crate::error::{LedgerError, LedgerResult};
use crate::transactions::TransactionLog;

/// Initial tail window when seeking for the last record
const TAIL_WINDOW: u64 = 4096;

// ═══════════════════════════════════════════════════════════════════════════
// INTEGRITY FAULTS
// ═══════════════════════════════════════════════════════════════════════════

/// What went wrong at a faulty block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// Stored hash differs from the recomputed one
    HashMismatch,
    /// `previous_hash` does not match the preceding block
    BrokenLink,
    /// Stored index differs from the block's position
    IndexMismatch { found: u64 },
    /// Record could not be parsed
    Unreadable(String),
    /// The store holds no blocks at all
    Empty,
}

/// First integrity violation found while walking the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFault {
    /// Position of the offending block
    pub index: u64,
    pub kind: FaultKind,
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::HashMismatch => write!(f, "block {}: hash mismatch", self.index),
            FaultKind::BrokenLink => write!(f, "block {}: previous_hash mismatch", self.index),
            FaultKind::IndexMismatch { found } => {
                write!(f, "block {}: stored index {}", self.index, found)
            }
            FaultKind::Unreadable(reason) => {
                write!(f, "block {}: unreadable ({})", self.index, reason)
            }
            FaultKind::Empty => write!(f, "chain is empty"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// HASH CHAIN
// ═══════════════════════════════════════════════════════════════════════════

/// Append-only, hash-linked block store
pub struct HashChain {
    path: PathBuf,
    transactions: Option<TransactionLog>,
    lock: RwLock<()>,
}

impl HashChain {
    /// Chain over `path` without touching the disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transactions: None,
            lock: RwLock::new(()),
        }
    }

    /// Chain over `path`, writing the genesis block if the store is absent or empty
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let chain = Self::new(path);
        chain.create_genesis()?;
        Ok(chain)
    }

    /// Mirror every appended transfer into `log`
    pub fn with_transaction_log(mut self, log: TransactionLog) -> Self {
        self.transactions = Some(log);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn transaction_log(&self) -> Option<&TransactionLog> {
        self.transactions.as_ref()
    }

    /// Write the genesis block if the store is empty.
    /// Returns the first block of the chain either way.
    pub fn create_genesis(&self) -> LedgerResult<Block> {
        let _guard = self.lock.write();
        if let Some(first) = self.first_block_unlocked()? {
            return Ok(first);
        }
        let genesis = Block::genesis();
        self.write_block(&genesis)?;
        log::info!("Created genesis block in {}", self.path.display());
        Ok(genesis)
    }

    /// Most recently appended block, `None` for an empty or missing store
    pub fn get_last_block(&self) -> LedgerResult<Option<Block>> {
        let _guard = self.lock.read();
        self.last_block_unlocked()
    }

    /// Timestamp of the most recent block
    pub fn get_last_block_timestamp(&self) -> LedgerResult<Option<f64>> {
        Ok(self.get_last_block()?.map(|b| b.timestamp))
    }

    /// Append a block carrying `data`.
    ///
    /// Transfers are mirrored into the transaction log before the block is
    /// persisted. `difficulty > 0` runs a proof-of-work search first.
    pub fn add_block(&self, data: BlockData, difficulty: usize) -> LedgerResult<Block> {
        if let Some(tx) = data.transactions().find(|tx| i64::try_from(tx.amount).is_err()) {
            return Err(LedgerError::AmountOutOfRange(tx.amount));
        }
        let _guard = self.lock.write();

        let last = match self.last_block_unlocked()? {
            Some(last) => last,
            None => {
                let genesis = Block::genesis();
                self.write_block(&genesis)?;
                genesis
            }
        };

        let mut block = Block::new(last.index + 1, data, last.hash.clone());
        block.mine(difficulty);

        if let Some(log) = &self.transactions {
            for tx in block.data.transactions() {
                log.append(block.timestamp, tx)?;
            }
        }

        self.write_block(&block)?;
        log::debug!("Appended block {} ({})", block.index, block.hash);
        Ok(block)
    }

    /// Append a single transfer
    pub fn add_transaction(&self, transaction: Transaction) -> LedgerResult<Block> {
        self.add_block(BlockData::transaction(transaction), 0)
    }

    /// Walk the chain from genesis and report the first integrity violation
    pub fn verify(&self) -> LedgerResult<Option<ChainFault>> {
        let _guard = self.lock.read();

        if !self.path.exists() {
            return Ok(Some(ChainFault {
                index: 0,
                kind: FaultKind::Empty,
            }));
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut previous: Option<Block> = None;
        let mut position = 0u64;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let block: Block = match serde_json::from_str(&line) {
                Ok(block) => block,
                Err(e) => {
                    return Ok(Some(ChainFault {
                        index: position,
                        kind: FaultKind::Unreadable(e.to_string()),
                    }));
                }
            };

            let fault = if block.index != position {
                Some(FaultKind::IndexMismatch { found: block.index })
            } else if !block.is_self_consistent() {
                Some(FaultKind::HashMismatch)
            } else {
                let expected = previous
                    .as_ref()
                    .map(|p| p.hash.as_str())
                    .unwrap_or(GENESIS_PREVIOUS_HASH);
                (block.previous_hash != expected).then_some(FaultKind::BrokenLink)
            };
            if let Some(kind) = fault {
                return Ok(Some(ChainFault {
                    index: position,
                    kind,
                }));
            }

            previous = Some(block);
            position += 1;
        }

        if previous.is_none() {
            return Ok(Some(ChainFault {
                index: 0,
                kind: FaultKind::Empty,
            }));
        }
        Ok(None)
    }

    /// `true` when every hash and link checks out.
    /// The first failure is logged; only storage errors are returned as `Err`.
    pub fn is_chain_valid(&self) -> LedgerResult<bool> {
        match self.verify()? {
            None => Ok(true),
            Some(fault) => {
                log::warn!("Chain integrity violation: {}", fault);
                Ok(false)
            }
        }
    }

    /// Credits minus debits for `digest` by full replay.
    /// `None` if the digest never appears in any transaction.
    pub fn get_balance(&self, digest: &str) -> LedgerResult<Option<i64>> {
        let mut balance = None;
        for block in self.snapshot()? {
            for tx in block.data.transactions() {
                if let Some(delta) = tx.effect_on(digest) {
                    balance = Some(balance.unwrap_or(0i64).saturating_add(delta));
                }
            }
        }
        Ok(balance)
    }

    /// Every block, read under one lock
    pub fn snapshot(&self) -> LedgerResult<Vec<Block>> {
        let _guard = self.lock.read();
        self.read_all_unlocked()
    }

    /// Number of blocks in the store
    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.get_last_block()?.is_none())
    }

    /// Rebuild the attached transaction log from the chain.
    /// Appends wait until the rebuild is done.
    pub fn regenerate_transaction_log(&self) -> LedgerResult<usize> {
        let _guard = self.lock.read();
        let blocks = self.read_all_unlocked()?;
        match &self.transactions {
            Some(log) => log.regenerate(&blocks),
            None => Ok(0),
        }
    }

    // ─── unlocked helpers (caller holds the lock) ───────────────────────────

    fn write_block(&self, block: &Block) -> LedgerResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(block)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    fn first_block_unlocked(&self) -> LedgerResult<Option<Block>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            return parse_line(&line, i + 1).map(Some);
        }
        Ok(None)
    }

    fn last_block_unlocked(&self) -> LedgerResult<Option<Block>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.path)?;
        if let Some(line) = read_last_line(&mut file)? {
            if let Ok(block) = serde_json::from_str::<Block>(&line) {
                return Ok(Some(block));
            }
            log::warn!("Tail read of {} was ambiguous, falling back to full scan", self.path.display());
        }
        Ok(self.read_all_unlocked()?.pop())
    }

    fn read_all_unlocked(&self) -> LedgerResult<Vec<Block>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut blocks = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            blocks.push(parse_line(&line, i + 1)?);
        }
        Ok(blocks)
    }
}

fn parse_line(line: &str, line_no: usize) -> LedgerResult<Block> {
    serde_json::from_str(line).map_err(|e| LedgerError::Corrupt {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Read the final non-empty line by seeking backwards from the end,
/// doubling the window until a line boundary is inside it.
fn read_last_line(file: &mut File) -> LedgerResult<Option<String>> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut window = TAIL_WINDOW;
    loop {
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((len - start) as usize);
        Read::by_ref(file).take(len - start).read_to_end(&mut buf)?;

        let end = buf
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map(|p| p + 1)
            .unwrap_or(0);
        let body = &buf[..end];

        match body.iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                return Ok(Some(String::from_utf8_lossy(&body[pos + 1..]).into_owned()));
            }
            None if start == 0 => {
                if body.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(String::from_utf8_lossy(body).into_owned()));
            }
            None => window = window.saturating_mul(2),
        }
    }
}
