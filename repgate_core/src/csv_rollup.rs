//! CSV rollup functionality for archiving WAL ledger events.
//!
//! This module implements atomic WAL-to-CSV conversion with proper error handling
//! to prevent data loss.

use crate::{LedgerEvent, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;

/// A row in the CSV archive
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CsvRow {
    pub id: String,
    pub kind: String,
    pub amount: u64,
    pub at: String,
    pub exercise: Option<String>,
    pub reps: Option<u32>,
}

impl From<&LedgerEvent> for CsvRow {
    fn from(event: &LedgerEvent) -> Self {
        CsvRow {
            id: event.id.to_string(),
            kind: event.kind.as_str().to_string(),
            amount: event.amount,
            at: event.at.to_rfc3339(),
            exercise: event.exercise.clone(),
            reps: event.reps,
        }
    }
}

/// Roll up WAL events into CSV and archive the WAL atomically
///
/// This function:
/// 1. Reads all events from the WAL
/// 2. Appends them to the CSV file (creates with headers if needed)
/// 3. Syncs the CSV to disk
/// 4. Renames the WAL to .processed
/// 5. Returns the number of events processed
///
/// Callers that share the WAL with live writers must hold the ledger lock.
pub fn wal_to_csv_and_archive(wal_path: &Path, csv_path: &Path) -> Result<usize> {
    let events = crate::wal::read_events(wal_path)?;

    if events.is_empty() {
        tracing::info!("No events in WAL to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    // Only a fresh file gets a header row
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for event in &events {
        writer.serialize(CsvRow::from(event))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} ledger events to CSV", events.len());

    let processed_path = wal_path.with_extension("wal.processed");
    std::fs::rename(wal_path, &processed_path)?;

    tracing::info!("Archived WAL to {:?}", processed_path);

    Ok(events.len())
}

/// Clean up old processed WAL files
///
/// This removes all .wal.processed files in the given directory.
pub fn cleanup_processed_wals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_processed = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".wal.processed"));

        if is_processed {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed WAL {:?}", path);
            count += 1;
        }
    }

    tracing::info!("Cleaned up {} processed WAL files", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{EventSink, JsonlSink};
    use crate::LedgerEventKind;

    #[test]
    fn test_rollup_moves_events_to_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");
        let csv_path = temp_dir.path().join("events.csv");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&[
            LedgerEvent::new(LedgerEventKind::Earn, 1),
            LedgerEvent::new(LedgerEventKind::Spend, 1),
        ])
        .unwrap();

        let count = wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        assert_eq!(count, 2);
        assert!(!wal_path.exists());
        assert!(temp_dir.path().join("events.wal.processed").exists());

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3); // header + 2 rows
        assert!(csv.starts_with("id,kind,amount,at,exercise,reps"));
    }

    #[test]
    fn test_second_rollup_appends_without_header() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");
        let csv_path = temp_dir.path().join("events.csv");

        for _ in 0..2 {
            JsonlSink::new(&wal_path)
                .append(&[LedgerEvent::new(LedgerEventKind::Earn, 1)])
                .unwrap();
            wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();
        }

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert_eq!(csv.matches("id,kind").count(), 1);
    }

    #[test]
    fn test_empty_wal_is_noop() {
        let temp_dir = tempfile::tempdir().unwrap();
        let count = wal_to_csv_and_archive(
            &temp_dir.path().join("events.wal"),
            &temp_dir.path().join("events.csv"),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert!(!temp_dir.path().join("events.csv").exists());
    }

    #[test]
    fn test_cleanup_processed_wals() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("events.wal.processed"), "").unwrap();
        std::fs::write(temp_dir.path().join("events.wal"), "").unwrap();

        assert_eq!(cleanup_processed_wals(temp_dir.path()).unwrap(), 1);
        assert!(temp_dir.path().join("events.wal").exists());
    }
}
