//! Block and transaction records

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::digest::sha256_hex;

/// Payload marker written into the genesis block
pub const GENESIS_MARKER: &str = "Genesis Block";

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A single coin movement between two identity digests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Digest of the paying identity
    pub sender: String,
    /// Digest of the receiving identity
    pub receiver: String,
    /// Whole coins moved
    pub amount: u64,
    /// Short tag naming what caused the transfer (e.g. "slot_machine")
    pub method: String,
}

impl Transaction {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u64,
        method: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            method: method.into(),
        }
    }

    /// Amount as a balance delta. Amounts past `i64::MAX` are refused on
    /// append; one read back from a hand-edited store saturates.
    pub fn signed_amount(&self) -> i64 {
        i64::try_from(self.amount).unwrap_or(i64::MAX)
    }

    /// Signed effect of this transaction on `digest`, or `None` if it is not involved
    pub fn effect_on(&self, digest: &str) -> Option<i64> {
        let amount = self.signed_amount();
        match (self.sender == digest, self.receiver == digest) {
            (true, true) => Some(0),
            (true, false) => Some(-amount),
            (false, true) => Some(amount),
            (false, false) => None,
        }
    }
}

/// Wrapper giving the on-disk `{"transaction": {...}}` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
}

/// Block payload: the genesis marker or a list of transaction records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Marker(String),
    Transactions(Vec<TransactionRecord>),
}

impl BlockData {
    /// Payload holding a single transfer
    pub fn transaction(transaction: Transaction) -> Self {
        BlockData::Transactions(vec![TransactionRecord { transaction }])
    }

    /// Transactions carried by this payload (empty for markers)
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> + '_ {
        let records: &[TransactionRecord] = match self {
            BlockData::Marker(_) => &[],
            BlockData::Transactions(records) => records,
        };
        records.iter().map(|r| &r.transaction)
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, BlockData::Marker(_))
    }

    /// Canonical JSON used inside the hash preimage
    fn canonical(&self) -> String {
        // Serializing strings, integers and derived structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, 0 for genesis
    pub index: u64,
    /// Seconds since the Unix epoch at creation
    pub timestamp: f64,
    /// Payload
    pub data: BlockData,
    /// Hash of the preceding block, "0" for genesis
    pub previous_hash: String,
    /// Proof-of-work counter, 0 when not mined
    pub nonce: u64,
    /// SHA-256 over the fields above
    pub hash: String,
}

impl Block {
    /// Build a block stamped with the current time
    pub fn new(index: u64, data: BlockData, previous_hash: impl Into<String>) -> Self {
        Self::with_timestamp(index, now_timestamp(), data, previous_hash)
    }

    /// Build a block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        timestamp: f64,
        data: BlockData,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    /// Genesis block
    pub fn genesis() -> Self {
        Self::new(
            0,
            BlockData::Marker(GENESIS_MARKER.to_string()),
            GENESIS_PREVIOUS_HASH,
        )
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> String {
        let preimage = format!(
            "{}{}{}{}{}",
            self.index,
            self.timestamp,
            self.data.canonical(),
            self.previous_hash,
            self.nonce
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Does the stored hash match the stored fields?
    pub fn is_self_consistent(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Search nonces until the hash has `difficulty` leading zero hex digits.
    /// A difficulty of 0 leaves the block untouched.
    pub fn mine(&mut self, difficulty: usize) {
        if difficulty == 0 {
            return;
        }
        let target = "0".repeat(difficulty);
        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }
        log::debug!(
            "Mined block {} at difficulty {} (nonce {})",
            self.index,
            difficulty,
            self.nonce
        );
    }
}

/// Current time as seconds since the epoch, microsecond resolution
pub fn now_timestamp() -> f64 {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    micros as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> BlockData {
        BlockData::transaction(Transaction::new("a".repeat(64), "b".repeat(64), 25, "transfer"))
    }

    #[test]
    fn test_hash_is_deterministic() {
        let block = Block::with_timestamp(3, 1_700_000_000.25, sample_data(), "f".repeat(64));
        assert_eq!(block.hash, block.compute_hash());
        assert!(block.is_self_consistent());
    }

    #[test]
    fn test_hash_survives_json_round_trip() {
        let block = Block::new(1, sample_data(), "e".repeat(64));
        let line = serde_json::to_string(&block).unwrap();
        let restored: Block = serde_json::from_str(&line).unwrap();
        assert_eq!(restored, block);
        assert!(restored.is_self_consistent());
    }

    #[test]
    fn test_field_change_breaks_hash() {
        let mut block = Block::with_timestamp(1, 10.0, sample_data(), "0");
        block.nonce = 7;
        assert!(!block.is_self_consistent());
    }

    #[test]
    fn test_on_disk_shape() {
        let block = Block::with_timestamp(1, 10.5, sample_data(), "0");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["data"][0]["transaction"]["amount"], 25);
        assert_eq!(value["data"][0]["transaction"]["method"], "transfer");

        let genesis = Block::genesis();
        let value = serde_json::to_value(&genesis).unwrap();
        assert_eq!(value["data"], GENESIS_MARKER);
        assert_eq!(value["previous_hash"], "0");
    }

    #[test]
    fn test_mining_finds_leading_zeros() {
        let mut block = Block::with_timestamp(1, 42.0, sample_data(), "0");
        block.mine(2);
        assert!(block.hash.starts_with("00"));
        assert!(block.is_self_consistent());
    }

    #[test]
    fn test_mining_difficulty_zero_is_noop() {
        let mut block = Block::with_timestamp(1, 42.0, sample_data(), "0");
        let before = block.clone();
        block.mine(0);
        assert_eq!(block, before);
    }

    #[test]
    fn test_transaction_effect() {
        let tx = Transaction::new("s", "r", 10, "transfer");
        assert_eq!(tx.effect_on("s"), Some(-10));
        assert_eq!(tx.effect_on("r"), Some(10));
        assert_eq!(tx.effect_on("x"), None);
    }

    #[test]
    fn test_signed_amount_clamps() {
        let largest = Transaction::new("s", "r", i64::MAX as u64, "transfer");
        assert_eq!(largest.effect_on("s"), Some(-i64::MAX));

        let huge = Transaction::new("s", "r", u64::MAX, "transfer");
        assert_eq!(huge.signed_amount(), i64::MAX);
        assert_eq!(huge.effect_on("r"), Some(i64::MAX));
    }
}
