//! Durable backing for the ledger.
//!
//! A store hands out exclusive access between `begin` and `commit` (or
//! `rollback`). The coordinator holds its own mutex around that window, so
//! the store's job is to extend the exclusion to other processes and to make
//! committed changes durable.

use crate::state::{read_state, StoredState};
use crate::wal::{EventSink, JsonlSink};
use crate::{Error, LedgerEvent, LedgerRecord, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Backing store for ledger counters and events
pub trait LedgerStore: Send {
    /// Acquire exclusive access and return the latest durable record
    fn begin(&mut self) -> Result<LedgerRecord>;

    /// Persist events then the record, and release exclusive access
    fn commit(&mut self, record: &LedgerRecord, events: &[LedgerEvent]) -> Result<()>;

    /// Release exclusive access without writing
    fn rollback(&mut self);

    /// Latest committed record
    fn read(&self) -> Result<LedgerRecord>;

    /// Recorded events, newest first
    fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<LedgerEvent>>;

    /// Archive the live event log. Returns the number of events archived.
    fn rollup(&mut self) -> Result<usize> {
        Ok(0)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: LedgerRecord,
    events: Vec<LedgerEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&mut self) -> Result<LedgerRecord> {
        Ok(self.record.clone())
    }

    fn commit(&mut self, record: &LedgerRecord, events: &[LedgerEvent]) -> Result<()> {
        self.events.extend_from_slice(events);
        self.record = record.clone();
        Ok(())
    }

    fn rollback(&mut self) {}

    fn read(&self) -> Result<LedgerRecord> {
        Ok(self.record.clone())
    }

    fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<LedgerEvent>> {
        Ok(self
            .events
            .iter()
            .rev()
            .filter(|e| since.map_or(true, |cutoff| e.at >= cutoff))
            .cloned()
            .collect())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Paths making up a file-backed ledger under one data directory
#[derive(Clone, Debug)]
pub struct LedgerPaths {
    pub ledger_dir: PathBuf,
    pub state: PathBuf,
    pub wal: PathBuf,
    pub lock: PathBuf,
    pub csv: PathBuf,
}

impl LedgerPaths {
    pub fn new(data_dir: &Path) -> Self {
        let ledger_dir = data_dir.join("ledger");
        Self {
            state: ledger_dir.join("state.json"),
            wal: ledger_dir.join("events.wal"),
            lock: ledger_dir.join("ledger.lock"),
            csv: data_dir.join("events.csv"),
            ledger_dir,
        }
    }
}

/// Store backed by a state file, a JSONL event log and a CSV archive
///
/// An exclusive lock on `ledger.lock` is held from `begin` until `commit` or
/// `rollback`, so every process sharing the data directory sees a strict
/// order of ledger transactions.
pub struct FileStore {
    paths: LedgerPaths,
    sink: JsonlSink,
    held: Option<File>,
}

impl FileStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        let paths = LedgerPaths::new(data_dir);
        std::fs::create_dir_all(&paths.ledger_dir)?;
        tracing::debug!("Opened ledger store at {:?}", paths.ledger_dir);

        Ok(Self {
            sink: JsonlSink::new(&paths.wal),
            paths,
            held: None,
        })
    }

    pub fn paths(&self) -> &LedgerPaths {
        &self.paths
    }

    fn acquire(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.paths.lock)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    /// Latest record, rebuilt from the event log when the state file is
    /// missing or damaged
    fn load_record(&self) -> Result<LedgerRecord> {
        match read_state(&self.paths.state)? {
            StoredState::Loaded(record) => Ok(record),
            StoredState::Missing | StoredState::Damaged => self.rebuild(),
        }
    }

    fn rebuild(&self) -> Result<LedgerRecord> {
        let events = crate::history::load_events(&self.paths.wal, &self.paths.csv, None)?;
        if events.is_empty() {
            return Ok(LedgerRecord::default());
        }

        match LedgerRecord::from_events(&events) {
            Some(record) => {
                tracing::warn!(
                    "Rebuilt ledger state from {} events: earned {}, spent {}",
                    events.len(),
                    record.earned,
                    record.spent
                );
                Ok(record)
            }
            None => {
                tracing::warn!("Event log does not add up, starting ledger from zero");
                Ok(LedgerRecord::default())
            }
        }
    }

    /// Append events then save the record. If either step fails the log is
    /// cut back to where it was, so no event outlives a failed commit.
    fn write(&mut self, record: &LedgerRecord, events: &[LedgerEvent]) -> Result<()> {
        let mark = self.sink.byte_len()?;

        let result = self
            .sink
            .append(events)
            .and_then(|_| record.save(&self.paths.state));

        if result.is_err() {
            if let Err(e) = self.sink.truncate(mark) {
                tracing::error!("Failed to undo WAL append after failed commit: {}", e);
            }
        }
        result
    }

    fn release(&mut self) {
        if let Some(file) = self.held.take() {
            if let Err(e) = file.unlock() {
                tracing::warn!("Failed to release ledger lock: {}", e);
            }
        }
    }
}

impl LedgerStore for FileStore {
    fn begin(&mut self) -> Result<LedgerRecord> {
        if self.held.is_some() {
            return Err(Error::State("ledger transaction already open".into()));
        }
        self.held = Some(self.acquire()?);

        match self.load_record() {
            Ok(record) => Ok(record),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn commit(&mut self, record: &LedgerRecord, events: &[LedgerEvent]) -> Result<()> {
        if self.held.is_none() {
            return Err(Error::State("commit without an open ledger transaction".into()));
        }

        let result = self.write(record, events);
        self.release();
        result
    }

    fn rollback(&mut self) {
        self.release();
    }

    fn read(&self) -> Result<LedgerRecord> {
        self.load_record()
    }

    fn history(&self, since: Option<DateTime<Utc>>) -> Result<Vec<LedgerEvent>> {
        crate::history::load_events(&self.paths.wal, &self.paths.csv, since)
    }

    fn rollup(&mut self) -> Result<usize> {
        let lock = self.acquire()?;
        let result = crate::csv_rollup::wal_to_csv_and_archive(&self.paths.wal, &self.paths.csv);
        if let Err(e) = lock.unlock() {
            tracing::warn!("Failed to release ledger lock: {}", e);
        }
        result
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        self.release();
    }
}
