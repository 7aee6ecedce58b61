//! Ledger event history across the live WAL and the CSV archive.
//!
//! Earn events make up the exercise history, spend and spend_rejected
//! events make up the request history.

use crate::csv_rollup::CsvRow;
use crate::{LedgerEvent, LedgerEventKind, Result};
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

impl TryFrom<CsvRow> for LedgerEvent {
    type Error = crate::Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| crate::Error::Other(format!("Invalid UUID: {}", e)))?;

        let at = DateTime::parse_from_rfc3339(&row.at)
            .map_err(|e| crate::Error::Other(format!("Invalid date: {}", e)))?
            .with_timezone(&Utc);

        Ok(LedgerEvent {
            id,
            kind: row.kind.parse()?,
            amount: row.amount,
            at,
            exercise: row.exercise.filter(|e| !e.is_empty()),
            reps: row.reps,
        })
    }
}

/// Load events from both WAL and CSV, optionally only those at or after `since`
///
/// Returns events sorted newest first, deduplicated by id.
pub fn load_events(
    wal_path: &Path,
    csv_path: &Path,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<LedgerEvent>> {
    let keep = |e: &LedgerEvent| since.map_or(true, |cutoff| e.at >= cutoff);
    let mut events = Vec::new();
    let mut seen_ids = HashSet::new();

    // WAL first: it holds the most recent events
    for event in crate::wal::read_events(wal_path)? {
        if keep(&event) && seen_ids.insert(event.id) {
            events.push(event);
        }
    }

    if csv_path.exists() {
        let mut csv_count = 0;
        for event in load_events_from_csv(csv_path)? {
            if keep(&event) && seen_ids.insert(event.id) {
                events.push(event);
                csv_count += 1;
            }
        }
        tracing::debug!("Loaded {} events from CSV", csv_count);
    }

    events.sort_by(|a, b| b.at.cmp(&a.at));

    tracing::debug!("Loaded {} ledger events", events.len());
    Ok(events)
}

fn load_events_from_csv(path: &Path) -> Result<Vec<LedgerEvent>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut events = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match LedgerEvent::try_from(row) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("Failed to parse CSV row: {}", e),
            },
            Err(e) => tracing::warn!("Failed to deserialize CSV row: {}", e),
        }
    }

    Ok(events)
}

/// Earn events, in the order given
pub fn exercise_history(events: &[LedgerEvent]) -> Vec<&LedgerEvent> {
    events
        .iter()
        .filter(|e| e.kind == LedgerEventKind::Earn)
        .collect()
}

/// Spend attempts (successful and blocked), in the order given
pub fn request_history(events: &[LedgerEvent]) -> Vec<&LedgerEvent> {
    events
        .iter()
        .filter(|e| matches!(e.kind, LedgerEventKind::Spend | LedgerEventKind::SpendRejected))
        .collect()
}
