//! Casino settings
//!
//! Where the ledger, export and reel files live, which identity is the
//! house, and how long a player waits for their previous play to finish.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cs_ledger::identity_digest;

use crate::error::CasinoResult;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoSettings {
    /// Directory holding every data file
    pub data_dir: PathBuf,
    /// Ledger file name, one block per line
    pub ledger_file: String,
    /// Transaction export file name (TSV)
    pub transactions_file: String,
    /// Reel configuration file name
    pub reels_file: String,
    /// Name hashed into the house identity
    pub house_name: String,
    /// How long a new play waits for the player's previous play (ms)
    pub play_wait_ms: u64,
    /// How long a player may leave reels spinning before the play settles itself (ms)
    pub play_timeout_ms: u64,
    /// Starting bonus per pip of the die
    pub starting_bonus_per_pip: u64,
    /// Starting bonus when the die is disabled
    pub starting_bonus_flat: u64,
    /// Leading zero hex digits required of new blocks (0 = no mining)
    pub proof_of_work_difficulty: usize,
}

impl Default for CasinoSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            ledger_file: "ledger.jsonl".to_string(),
            transactions_file: "transactions.tsv".to_string(),
            reels_file: "reels.json".to_string(),
            house_name: "house".to_string(),
            play_wait_ms: 3000,
            play_timeout_ms: 30_000,
            starting_bonus_per_pip: 100,
            starting_bonus_flat: 350,
            proof_of_work_difficulty: 0,
        }
    }
}

impl CasinoSettings {
    /// Defaults rooted at `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file. A missing file yields defaults; a malformed
    /// one is an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> CasinoResult<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> CasinoResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.ledger_file)
    }

    pub fn transactions_path(&self) -> PathBuf {
        self.data_dir.join(&self.transactions_file)
    }

    pub fn reels_path(&self) -> PathBuf {
        self.data_dir.join(&self.reels_file)
    }

    /// Ledger identity of the house
    pub fn house_digest(&self) -> String {
        identity_digest(&self.house_name)
    }

    pub fn play_wait(&self) -> Duration {
        Duration::from_millis(self.play_wait_ms)
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_millis(self.play_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CasinoSettings::load_from(dir.path().join("casino.json")).unwrap();
        assert_eq!(settings, CasinoSettings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casino.json");
        fs::write(&path, r#"{"house_name": "bank", "play_wait_ms": 10}"#).unwrap();

        let settings = CasinoSettings::load_from(&path).unwrap();
        assert_eq!(settings.house_name, "bank");
        assert_eq!(settings.play_wait(), Duration::from_millis(10));
        assert_eq!(settings.ledger_file, "ledger.jsonl");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("casino.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(CasinoSettings::load_from(&path).is_err());
    }

    #[test]
    fn test_save_roundtrip_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CasinoSettings::in_dir(dir.path());
        let path = dir.path().join("nested/casino.json");
        settings.save_to(&path).unwrap();

        assert_eq!(CasinoSettings::load_from(&path).unwrap(), settings);
        assert_eq!(settings.ledger_path(), dir.path().join("ledger.jsonl"));
        assert_eq!(settings.house_digest(), identity_digest("house"));
    }
}
