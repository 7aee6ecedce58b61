//! Ledger record persistence with file locking.
//!
//! The earned/spent counters live in a single JSON file that is replaced
//! atomically on every commit.

use crate::{Error, LedgerEvent, LedgerEventKind, LedgerRecord, Result};
use fs2::FileExt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Outcome of reading the state file
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StoredState {
    Missing,
    Loaded(LedgerRecord),
    Damaged,
}

/// Read the state file with shared locking, classifying what was found
pub(crate) fn read_state(path: &Path) -> Result<StoredState> {
    if !path.exists() {
        tracing::debug!("No ledger state at {:?}", path);
        return Ok(StoredState::Missing);
    }

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("Unable to open ledger state {:?}: {}", path, e);
            return Ok(StoredState::Damaged);
        }
    };

    if let Err(e) = file.lock_shared() {
        tracing::warn!("Unable to lock ledger state {:?}: {}", path, e);
        return Ok(StoredState::Damaged);
    }

    let mut contents = String::new();
    let mut reader = std::io::BufReader::new(&file);
    if let Err(e) = reader.read_to_string(&mut contents) {
        let _ = file.unlock();
        tracing::warn!("Failed to read ledger state {:?}: {}", path, e);
        return Ok(StoredState::Damaged);
    }

    file.unlock()?;

    match serde_json::from_str::<LedgerRecord>(&contents) {
        Ok(record) if record.spent <= record.earned => {
            tracing::debug!("Loaded ledger state from {:?}", path);
            Ok(StoredState::Loaded(record))
        }
        Ok(record) => {
            tracing::warn!(
                "Ledger state {:?} has spent {} > earned {}",
                path,
                record.spent,
                record.earned
            );
            Ok(StoredState::Damaged)
        }
        Err(e) => {
            tracing::warn!("Failed to parse ledger state {:?}: {}", path, e);
            Ok(StoredState::Damaged)
        }
    }
}

impl LedgerRecord {
    /// Replay earn and spend events into counters
    ///
    /// Returns `None` if the events overflow or spend more than they earn.
    pub fn from_events(events: &[LedgerEvent]) -> Option<Self> {
        let mut record = Self::default();
        for event in events {
            match event.kind {
                LedgerEventKind::Earn => record.earned = record.earned.checked_add(event.amount)?,
                LedgerEventKind::Spend => record.spent = record.spent.checked_add(event.amount)?,
                LedgerEventKind::SpendRejected => continue,
            }
            if record.updated_at.map_or(true, |at| event.at > at) {
                record.updated_at = Some(event.at);
            }
        }

        if record.spent > record.earned {
            return None;
        }
        Some(record)
    }

    /// Save the ledger record with exclusive locking
    ///
    /// Atomically writes state by:
    /// 1. Writing to a temp file
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::State(format!("ledger path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved ledger state to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state_path = temp_dir.path().join("state.json");

        let record = LedgerRecord {
            earned: 7,
            spent: 3,
            updated_at: Some(Utc::now()),
        };
        record.save(&state_path).unwrap();

        assert_eq!(read_state(&state_path).unwrap(), StoredState::Loaded(record));
    }

    #[test]
    fn test_nonexistent_state_is_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = read_state(&temp_dir.path().join("nonexistent.json")).unwrap();
        assert_eq!(state, StoredState::Missing);
    }

    #[test]
    fn test_corrupted_state_is_damaged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state_path = temp_dir.path().join("corrupted.json");
        std::fs::write(&state_path, "{ invalid json }").unwrap();
        assert_eq!(read_state(&state_path).unwrap(), StoredState::Damaged);

        std::fs::write(&state_path, "").unwrap();
        assert_eq!(read_state(&state_path).unwrap(), StoredState::Damaged);
    }

    #[test]
    fn test_overspent_state_is_damaged() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state_path = temp_dir.path().join("state.json");
        std::fs::write(&state_path, r#"{"earned":1,"spent":5}"#).unwrap();
        assert_eq!(read_state(&state_path).unwrap(), StoredState::Damaged);
    }

    #[test]
    fn test_atomic_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state_path = temp_dir.path().join("state.json");

        LedgerRecord::default().save(&state_path).unwrap();

        assert!(state_path.exists());
        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "state.json")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only state.json, found extras: {:?}",
            extras
        );
    }

    #[test]
    fn test_from_events_replays_counters() {
        let events = vec![
            LedgerEvent::new(LedgerEventKind::Earn, 3),
            LedgerEvent::new(LedgerEventKind::Spend, 1),
            LedgerEvent::new(LedgerEventKind::SpendRejected, 1),
            LedgerEvent::new(LedgerEventKind::Spend, 1),
        ];
        let latest = events.iter().map(|e| e.at).max();

        let record = LedgerRecord::from_events(&events).unwrap();
        assert_eq!(record.earned, 3);
        assert_eq!(record.spent, 2);
        assert_eq!(record.updated_at, latest);
    }

    #[test]
    fn test_from_events_refuses_overspent_log() {
        let events = vec![
            LedgerEvent::new(LedgerEventKind::Earn, 1),
            LedgerEvent::new(LedgerEventKind::Spend, 2),
        ];
        assert_eq!(LedgerRecord::from_events(&events), None);
        assert_eq!(LedgerRecord::from_events(&[]), Some(LedgerRecord::default()));
    }
}
