#![forbid(unsafe_code)]

//! Core domain model and business logic for Repgate.
//!
//! This crate provides:
//! - Domain types (landmarks, postures, ledger records, notifications)
//! - Pose classification and rep detection
//! - Exercise catalog and sessions
//! - The earned/spent ledger and its persistence (WAL, CSV, state)
//! - Transaction coordinator, observer broadcast and request gate

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod pose;
pub mod detector;
pub mod session;
pub mod catalog;
pub mod ledger;
pub mod wal;
pub mod csv_rollup;
pub mod state;
pub mod history;
pub mod store;
pub mod broadcast;
pub mod coordinator;
pub mod gate;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use catalog::{get_default_catalog, ExerciseCatalog};
pub use pose::PoseClassifier;
pub use detector::{FrameOutcome, RepDetector};
pub use session::ExerciseSession;
pub use ledger::Ledger;
pub use store::{FileStore, LedgerPaths, LedgerStore, MemoryStore};
pub use broadcast::Subscription;
pub use coordinator::TransactionCoordinator;
pub use gate::{GateDecision, HookOutput};
