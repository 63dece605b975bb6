//! Ledger property tests
//!
//! Covers append monotonicity, hash determinism, tamper detection, balance
//! replay and serialized concurrent appends.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use cs_ledger::{Block, HashChain, Transaction, TransactionLog, identity_digest};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

fn seeded_chain(path: &Path) -> HashChain {
    let chain = HashChain::open(path).unwrap();
    let alice = identity_digest("alice");
    let bob = identity_digest("bob");
    let house = identity_digest("house");
    chain.add_transaction(Transaction::new(&house, &alice, 100, "starting_bonus")).unwrap();
    chain.add_transaction(Transaction::new(&house, &bob, 50, "starting_bonus")).unwrap();
    chain.add_transaction(Transaction::new(&alice, &bob, 30, "transfer")).unwrap();
    chain.add_transaction(Transaction::new(&bob, &house, 7, "slot_machine")).unwrap();
    chain
}

fn rewrite_line(path: &Path, line_no: usize, edit: impl FnOnce(&mut Value)) {
    let content = fs::read_to_string(path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut value: Value = serde_json::from_str(&lines[line_no]).unwrap();
    edit(&mut value);
    lines[line_no] = serde_json::to_string(&value).unwrap();
    fs::write(path, lines.join("\n") + "\n").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn indices_start_at_zero_and_link_to_predecessor() {
    let dir = tempfile::tempdir().unwrap();
    let chain = seeded_chain(&dir.path().join("ledger.jsonl"));
    let blocks = chain.snapshot().unwrap();

    assert_eq!(blocks.len(), 5);
    assert_eq!(blocks[0].previous_hash, "0");
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].index, pair[0].index + 1);
        assert_eq!(pair[1].previous_hash, pair[0].hash);
    }
    assert!(chain.is_chain_valid().unwrap());
}

#[test]
fn stored_hashes_recompute_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    seeded_chain(&path);

    for line in fs::read_to_string(&path).unwrap().lines() {
        let block: Block = serde_json::from_str(line).unwrap();
        assert_eq!(block.hash, block.compute_hash());
    }
}

#[test]
fn get_last_block_matches_snapshot_tail() {
    let dir = tempfile::tempdir().unwrap();
    let chain = seeded_chain(&dir.path().join("ledger.jsonl"));
    let tail = chain.snapshot().unwrap().pop().unwrap();
    assert_eq!(chain.get_last_block().unwrap().unwrap(), tail);
    assert_eq!(
        chain.get_last_block_timestamp().unwrap(),
        Some(tail.timestamp)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAMPER DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn any_field_edit_is_detected() {
    let edits: Vec<(&str, Box<dyn Fn(&mut Value)>)> = vec![
        ("index", Box::new(|v| v["index"] = Value::from(9))),
        ("timestamp", Box::new(|v| v["timestamp"] = Value::from(1.5))),
        (
            "amount",
            Box::new(|v| v["data"][0]["transaction"]["amount"] = Value::from(1_000_000)),
        ),
        (
            "method",
            Box::new(|v| v["data"][0]["transaction"]["method"] = Value::from("gift")),
        ),
        (
            "sender",
            Box::new(|v| v["data"][0]["transaction"]["sender"] = Value::from("f".repeat(64))),
        ),
        ("previous_hash", Box::new(|v| v["previous_hash"] = Value::from("a".repeat(64)))),
        ("nonce", Box::new(|v| v["nonce"] = Value::from(12))),
        ("hash", Box::new(|v| v["hash"] = Value::from("b".repeat(64)))),
    ];

    for (field, edit) in edits {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let chain = seeded_chain(&path);
        rewrite_line(&path, 2, |v| edit(v));
        assert!(
            !chain.is_chain_valid().unwrap(),
            "edit to {field} went unnoticed"
        );
    }
}

#[test]
fn recomputed_hash_still_breaks_the_next_link() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    let chain = seeded_chain(&path);

    // Forge a self-consistent block 2; block 3 no longer links to it
    rewrite_line(&path, 2, |v| {
        let mut block: Block = serde_json::from_value(v.clone()).unwrap();
        if let cs_ledger::BlockData::Transactions(records) = &mut block.data {
            records[0].transaction.amount = 1;
        }
        block.hash = block.compute_hash();
        *v = serde_json::to_value(&block).unwrap();
    });

    let fault = chain.verify().unwrap().unwrap();
    assert_eq!(fault.index, 3);
    assert_eq!(fault.kind, cs_ledger::FaultKind::BrokenLink);
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn balances_match_manual_sums() {
    let dir = tempfile::tempdir().unwrap();
    let chain = seeded_chain(&dir.path().join("ledger.jsonl"));

    assert_eq!(chain.get_balance(&identity_digest("alice")).unwrap(), Some(70));
    assert_eq!(chain.get_balance(&identity_digest("bob")).unwrap(), Some(73));
    assert_eq!(chain.get_balance(&identity_digest("house")).unwrap(), Some(-143));
    assert_eq!(chain.get_balance(&identity_digest("stranger")).unwrap(), None);

    // Replaying twice gives the same answer
    assert_eq!(chain.get_balance(&identity_digest("alice")).unwrap(), Some(70));
}

#[test]
fn export_agrees_with_chain_replay() {
    let dir = tempfile::tempdir().unwrap();
    let log = TransactionLog::new(dir.path().join("transactions.tsv"));
    let chain = HashChain::open(dir.path().join("ledger.jsonl"))
        .unwrap()
        .with_transaction_log(log);

    let names = ["alice", "bob", "carol"];
    let mut expected: HashMap<String, i64> = HashMap::new();
    for i in 0..12u64 {
        let from = identity_digest(names[(i % 3) as usize]);
        let to = identity_digest(names[((i + 1) % 3) as usize]);
        let amount = i * 3 + 1;
        chain.add_transaction(Transaction::new(&from, &to, amount, "transfer")).unwrap();
        *expected.entry(from).or_default() -= amount as i64;
        *expected.entry(to).or_default() += amount as i64;
    }

    let log = chain.transaction_log().unwrap();
    assert_eq!(log.records().unwrap().len(), 12);
    for (digest, balance) in &expected {
        assert_eq!(chain.get_balance(digest).unwrap(), Some(*balance));
        assert_eq!(log.balance_of(digest).unwrap(), Some(*balance));
    }

    let before = log.records().unwrap();
    assert_eq!(chain.regenerate_transaction_log().unwrap(), 12);
    assert_eq!(log.records().unwrap(), before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONCURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn concurrent_appends_are_serialized() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(HashChain::open(dir.path().join("ledger.jsonl")).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let chain = Arc::clone(&chain);
            thread::spawn(move || {
                for i in 0..10 {
                    chain
                        .add_transaction(Transaction::new(
                            identity_digest(&format!("writer-{t}")),
                            identity_digest("sink"),
                            i,
                            "transfer",
                        ))
                        .unwrap();
                    // Readers run alongside writers
                    chain.get_last_block().unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let blocks = chain.snapshot().unwrap();
    assert_eq!(blocks.len(), 81);
    for (i, block) in blocks.iter().enumerate() {
        assert_eq!(block.index, i as u64);
    }
    assert!(chain.is_chain_valid().unwrap());
}
