//! Transaction export (tab-separated)
//!
//! A derived view of every transfer recorded in the chain, one row per
//! transaction with columns `Time, Sender, Receiver, Amount, Method`.
//! The file is only ever appended to, and can be rebuilt in full from a
//! chain snapshot. Balance, holder and sponsor queries read it directly
//! instead of replaying the whole chain.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use parking_lot::Mutex;

use crate::block::{Block, Transaction};
use crate::error::{LedgerError, LedgerResult};

/// Column headers, in file order
pub const EXPORT_HEADERS: [&str; 5] = ["Time", "Sender", "Receiver", "Amount", "Method"];

/// One row of the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    /// UTC time of the block carrying the transaction
    pub time: String,
    pub transaction: Transaction,
}

/// Append-only TSV view of the ledger's transfers
pub struct TransactionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TransactionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one transfer
    pub fn append(&self, timestamp: f64, transaction: &Transaction) -> LedgerResult<()> {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = tsv_writer(file);
        if needs_header {
            writer.write_record(EXPORT_HEADERS)?;
        }
        write_row(&mut writer, timestamp, transaction)?;
        writer.flush()?;
        Ok(())
    }

    /// Rebuild the whole file from a chain snapshot. Returns the row count.
    pub fn regenerate(&self, blocks: &[Block]) -> LedgerResult<usize> {
        let _guard = self.write_lock.lock();
        let rows = write_export(&self.path, blocks)?;
        log::info!("Regenerated transaction export: {} row(s)", rows);
        Ok(rows)
    }

    /// Read every row
    pub fn records(&self) -> LedgerResult<Vec<ExportRow>> {
        read_export(&self.path)
    }

    /// Credits minus debits for `digest`, or `None` if it never appears
    pub fn balance_of(&self, digest: &str) -> LedgerResult<Option<i64>> {
        let mut balance = None;
        for row in self.records()? {
            if let Some(delta) = row.transaction.effect_on(digest) {
                balance = Some(balance.unwrap_or(0i64).saturating_add(delta));
            }
        }
        Ok(balance)
    }

    /// Identities holding a positive balance, richest first
    pub fn holders(&self) -> LedgerResult<Vec<(String, i64)>> {
        let mut balances: HashMap<String, i64> = HashMap::new();
        for row in self.records()? {
            let tx = row.transaction;
            let amount = tx.signed_amount();
            let sender = balances.entry(tx.sender).or_default();
            *sender = sender.saturating_sub(amount);
            let receiver = balances.entry(tx.receiver).or_default();
            *receiver = receiver.saturating_add(amount);
        }
        let mut holders: Vec<_> = balances.into_iter().filter(|(_, b)| *b > 0).collect();
        holders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(holders)
    }

    /// Senders ranked by the total they have sent to `receiver`
    pub fn sponsors_of(&self, receiver: &str) -> LedgerResult<Vec<(String, u64)>> {
        let mut totals: HashMap<String, u64> = HashMap::new();
        for row in self.records()? {
            let tx = row.transaction;
            if tx.receiver == receiver && tx.sender != receiver {
                *totals.entry(tx.sender).or_default() += tx.amount;
            }
        }
        let mut sponsors: Vec<_> = totals.into_iter().collect();
        sponsors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(sponsors)
    }
}

/// Write a full export of `blocks` to `path` via a temp file and rename
pub fn write_export(path: &Path, blocks: &[Block]) -> LedgerResult<usize> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tsv.tmp");
    let mut writer = tsv_writer(File::create(&tmp)?);
    writer.write_record(EXPORT_HEADERS)?;

    let mut rows = 0;
    for block in blocks {
        for tx in block.data.transactions() {
            write_row(&mut writer, block.timestamp, tx)?;
            rows += 1;
        }
    }
    writer.flush()?;
    drop(writer);

    fs::rename(&tmp, path)?;
    Ok(rows)
}

/// Parse an export file. A missing file reads as empty.
pub fn read_export(path: &Path) -> LedgerResult<Vec<ExportRow>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let field = |idx: usize| {
            record.get(idx).ok_or_else(|| LedgerError::CorruptExport {
                row,
                reason: format!("missing column {}", EXPORT_HEADERS[idx]),
            })
        };
        let amount = field(3)?
            .parse::<u64>()
            .map_err(|e| LedgerError::CorruptExport {
                row,
                reason: format!("bad amount: {e}"),
            })?;
        rows.push(ExportRow {
            time: field(0)?.to_string(),
            transaction: Transaction::new(field(1)?, field(2)?, amount, field(4)?),
        });
    }
    Ok(rows)
}

fn tsv_writer(file: File) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file)
}

fn write_row(
    writer: &mut csv::Writer<File>,
    timestamp: f64,
    tx: &Transaction,
) -> LedgerResult<()> {
    let amount = tx.amount.to_string();
    writer.write_record([
        format_time(timestamp).as_str(),
        tx.sender.as_str(),
        tx.receiver.as_str(),
        amount.as_str(),
        tx.method.as_str(),
    ])?;
    Ok(())
}

/// Block timestamp rendered as UTC wall-clock time
pub fn format_time(timestamp: f64) -> String {
    let secs = timestamp.floor() as i64;
    let nanos = ((timestamp - timestamp.floor()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockData;

    fn tx(sender: &str, receiver: &str, amount: u64) -> Transaction {
        Transaction::new(sender, receiver, amount, "transfer")
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("transactions.tsv"));
        log.append(0.0, &tx("a", "b", 5)).unwrap();
        log.append(1.0, &tx("b", "c", 2)).unwrap();

        let content = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Time\tSender\tReceiver\tAmount\tMethod");
        assert_eq!(lines[1], "1970-01-01 00:00:00\ta\tb\t5\ttransfer");
    }

    #[test]
    fn test_queries() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("transactions.tsv"));
        log.append(0.0, &tx("house", "alice", 100)).unwrap();
        log.append(0.0, &tx("house", "bob", 40)).unwrap();
        log.append(0.0, &tx("alice", "bob", 30)).unwrap();
        log.append(0.0, &tx("carol", "bob", 5)).unwrap();

        assert_eq!(log.balance_of("alice").unwrap(), Some(70));
        assert_eq!(log.balance_of("bob").unwrap(), Some(75));
        assert_eq!(log.balance_of("nobody").unwrap(), None);

        let holders = log.holders().unwrap();
        assert_eq!(holders, vec![("bob".to_string(), 75), ("alice".to_string(), 70)]);

        let sponsors = log.sponsors_of("bob").unwrap();
        assert_eq!(sponsors[0], ("house".to_string(), 40));
        assert_eq!(sponsors[1], ("alice".to_string(), 30));
        assert_eq!(sponsors[2], ("carol".to_string(), 5));
    }

    #[test]
    fn test_regenerate_matches_appends() {
        let dir = tempfile::tempdir().unwrap();
        let appended = TransactionLog::new(dir.path().join("a.tsv"));
        let rebuilt = TransactionLog::new(dir.path().join("b.tsv"));

        let blocks = vec![
            Block::with_timestamp(0, 0.0, BlockData::Marker("Genesis Block".into()), "0"),
            Block::with_timestamp(1, 60.0, BlockData::transaction(tx("a", "b", 3)), "x"),
            Block::with_timestamp(2, 120.0, BlockData::transaction(tx("b", "a", 1)), "y"),
        ];
        for block in &blocks {
            for t in block.data.transactions() {
                appended.append(block.timestamp, t).unwrap();
            }
        }
        assert_eq!(rebuilt.regenerate(&blocks).unwrap(), 2);
        assert_eq!(appended.records().unwrap(), rebuilt.records().unwrap());
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TransactionLog::new(dir.path().join("none.tsv"));
        assert!(log.records().unwrap().is_empty());
        assert!(log.holders().unwrap().is_empty());
    }
}
