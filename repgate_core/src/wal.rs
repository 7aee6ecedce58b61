//! Write-Ahead Log (WAL) for ledger events.
//!
//! Ledger events are appended to a JSONL (JSON Lines) file with file locking
//! to ensure safe concurrent access. The log is append-only: events are never
//! rewritten, only archived whole by the CSV rollup.

use crate::{LedgerEvent, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Event sink trait for persisting ledger events
pub trait EventSink {
    fn append(&mut self, events: &[LedgerEvent]) -> Result<()>;
}

/// JSONL-based event sink with file locking
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a new JSONL sink for the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes, 0 if it does not exist yet
    pub fn byte_len(&self) -> Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Cut the log back to `len` bytes, discarding anything appended after
    pub fn truncate(&self, len: u64) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.lock_exclusive()?;
        file.set_len(len)?;
        file.sync_data()?;
        file.unlock()?;

        tracing::debug!("Truncated WAL {:?} to {} bytes", self.path, len);
        Ok(())
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl EventSink for JsonlSink {
    fn append(&mut self, events: &[LedgerEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        // Serialize everything up front so a failure writes nothing
        let mut buf = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }

        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(&buf)?;
        writer.flush()?;
        drop(writer);

        // Events must be durable before the counters that reflect them
        file.sync_data()?;
        file.unlock()?;

        tracing::debug!("Appended {} ledger events to WAL", events.len());
        Ok(())
    }
}

/// Read all ledger events from a WAL file, oldest first
pub fn read_events(path: &Path) -> Result<Vec<LedgerEvent>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut events = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LedgerEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!("Failed to parse ledger event at line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} ledger events from WAL", events.len());
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LedgerEventKind;

    #[test]
    fn test_append_and_read_events() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");

        let earn = LedgerEvent::new(LedgerEventKind::Earn, 2);
        let spend = LedgerEvent::new(LedgerEventKind::Spend, 1);

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&[earn.clone()]).unwrap();
        sink.append(&[spend.clone()]).unwrap();

        let events = read_events(&wal_path).unwrap();
        assert_eq!(events, vec![earn, spend]);
    }

    #[test]
    fn test_append_nothing_creates_no_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");

        JsonlSink::new(&wal_path).append(&[]).unwrap();
        assert!(!wal_path.exists());
    }

    #[test]
    fn test_read_missing_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let events = read_events(&temp_dir.path().join("nonexistent.wal")).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");

        let mut sink = JsonlSink::new(&wal_path);
        sink.append(&[LedgerEvent::new(LedgerEventKind::Earn, 1)]).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
            writeln!(file, "{{ not json").unwrap();
        }
        sink.append(&[LedgerEvent::new(LedgerEventKind::Spend, 1)]).unwrap();

        assert_eq!(read_events(&wal_path).unwrap().len(), 2);
    }

    #[test]
    fn test_truncate_discards_later_appends() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("events.wal");

        let mut sink = JsonlSink::new(&wal_path);
        assert_eq!(sink.byte_len().unwrap(), 0);

        let kept = LedgerEvent::new(LedgerEventKind::Earn, 1);
        sink.append(&[kept.clone()]).unwrap();
        let mark = sink.byte_len().unwrap();

        sink.append(&[LedgerEvent::new(LedgerEventKind::Spend, 1)]).unwrap();
        sink.truncate(mark).unwrap();

        assert_eq!(read_events(&wal_path).unwrap(), vec![kept]);
    }
}
