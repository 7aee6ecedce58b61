//! Error types for the repgate_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for repgate_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Non-positive amount passed to a ledger operation (rejected before mutation)
    #[error("Invalid amount {0}: must be a positive integer")]
    InvalidAmount(i64),

    /// Spend exceeds the available balance (no mutation, logged as spend_rejected)
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// Landmark set with the wrong cardinality or unusable values
    #[error("Malformed landmark set: {0}")]
    MalformedLandmarkSet(String),

    /// A broadcast recipient fell behind and lost notifications
    #[error("Observer '{observer}' fell behind and missed {missed} notification(s)")]
    ObserverTimeout { observer: String, missed: u64 },

    /// A ledger counter would exceed its range
    #[error("Ledger counter overflow: {counter} + {amount}")]
    CounterOverflow { counter: &'static str, amount: u64 },

    /// Completion reported for an exercise the catalog does not know
    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    /// Completion reported with fewer reps than the exercise requires
    #[error("Need {required} reps of {exercise}, got {completed}")]
    InsufficientReps {
        exercise: String,
        required: u32,
        completed: u32,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger state management error
    #[error("State error: {0}")]
    State(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for outcomes that are part of normal operation rather than faults
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBalance { .. }
                | Error::InvalidAmount(_)
                | Error::UnknownExercise(_)
                | Error::InsufficientReps { .. }
        )
    }
}
