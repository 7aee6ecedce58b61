//! Core domain types for the Repgate system.
//!
//! This module defines the fundamental types used throughout the system:
//! - Pose landmarks and classified postures
//! - Exercise definitions and completion events
//! - Ledger records, events and balance snapshots
//! - Observer notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Pose Types
// ============================================================================

/// Number of landmarks produced per frame by the upstream pose model
pub const LANDMARK_COUNT: usize = 33;

pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;

/// A single estimated body-joint position with a confidence score.
///
/// `x` and `y` are normalized to the frame (y grows downwards), `z` is a
/// relative depth estimate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    fn is_well_formed(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && (0.0..=1.0).contains(&self.visibility)
    }
}

/// Landmarks for one frame, in the upstream model's positional schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct LandmarkSet(Vec<Landmark>);

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self(landmarks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.0
    }

    /// Check cardinality and value ranges
    pub fn validate(&self) -> crate::Result<()> {
        if self.0.len() != LANDMARK_COUNT {
            return Err(crate::Error::MalformedLandmarkSet(format!(
                "expected {} landmarks, got {}",
                LANDMARK_COUNT,
                self.0.len()
            )));
        }

        if let Some(index) = self.0.iter().position(|l| !l.is_well_formed()) {
            return Err(crate::Error::MalformedLandmarkSet(format!(
                "landmark {} has out-of-range values",
                index
            )));
        }

        Ok(())
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Self(landmarks)
    }
}

/// Classified body configuration for one frame
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostureState {
    Up,
    Down,
    Transition,
    #[default]
    Unknown,
}

// ============================================================================
// Exercise Types
// ============================================================================

/// A configured exercise and what completing it is worth
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExerciseDefinition {
    pub name: String,
    pub display_name: String,
    pub reps_required: u32,
    pub credits_awarded: u32,
}

/// Emitted by an exercise session when its target is reached
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionEvent {
    pub exercise_kind: String,
    pub reps_completed: u32,
}

/// A validated completion and the credits it is worth
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Award {
    pub exercise_kind: String,
    pub display_name: String,
    pub reps: u32,
    pub credits: u32,
    pub message: String,
}

// ============================================================================
// Ledger Types
// ============================================================================

/// Durable earned/spent counter pair
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    pub earned: u64,
    pub spent: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LedgerRecord {
    pub fn available(&self) -> u64 {
        self.earned.saturating_sub(self.spent)
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            available: self.available(),
            earned: self.earned,
            spent: self.spent,
        }
    }
}

/// Read-only view of the ledger counters
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub available: u64,
    pub earned: u64,
    pub spent: u64,
}

/// Kind of ledger mutation recorded in the event log
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    Earn,
    Spend,
    SpendRejected,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::Earn => "earn",
            LedgerEventKind::Spend => "spend",
            LedgerEventKind::SpendRejected => "spend_rejected",
        }
    }
}

impl std::str::FromStr for LedgerEventKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "earn" => Ok(LedgerEventKind::Earn),
            "spend" => Ok(LedgerEventKind::Spend),
            "spend_rejected" => Ok(LedgerEventKind::SpendRejected),
            other => Err(crate::Error::Other(format!(
                "Unknown ledger event kind: {}",
                other
            ))),
        }
    }
}

/// Immutable audit record of one ledger mutation attempt
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEvent {
    pub id: Uuid,
    pub kind: LedgerEventKind,
    pub amount: u64,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
}

impl LedgerEvent {
    pub fn new(kind: LedgerEventKind, amount: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            amount,
            at: Utc::now(),
            exercise: None,
            reps: None,
        }
    }

    /// True for spend attempts that were refused
    pub fn is_blocked(&self) -> bool {
        self.kind == LedgerEventKind::SpendRejected
    }
}

// ============================================================================
// Notification Types
// ============================================================================

/// Message fanned out to observers after a committed mutation
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    BalanceUpdate {
        available: u64,
        earned: u64,
        spent: u64,
    },
    RequestAwarded {
        exercise_kind: String,
        credits_awarded: u32,
        message: String,
    },
}

impl From<BalanceSnapshot> for Notification {
    fn from(snapshot: BalanceSnapshot) -> Self {
        Notification::BalanceUpdate {
            available: snapshot.available,
            earned: snapshot.earned,
            spent: snapshot.spent,
        }
    }
}

impl From<&Award> for Notification {
    fn from(award: &Award) -> Self {
        Notification::RequestAwarded {
            exercise_kind: award.exercise_kind.clone(),
            credits_awarded: award.credits,
            message: award.message.clone(),
        }
    }
}
