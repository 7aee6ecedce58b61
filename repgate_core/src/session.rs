//! Exercise session: a rep detector with a target.

use crate::config::DetectorConfig;
use crate::detector::RepDetector;
use crate::{CompletionEvent, Error, ExerciseDefinition, LandmarkSet, Result};
use chrono::{DateTime, Utc};

/// Tracks one person's frames toward an exercise target
///
/// Emits a [`CompletionEvent`] exactly once each time the target is reached,
/// then starts counting again from zero.
#[derive(Clone, Debug)]
pub struct ExerciseSession {
    exercise_kind: String,
    target: u32,
    detector: RepDetector,
    completions: u32,
}

impl ExerciseSession {
    pub fn new(exercise_kind: impl Into<String>, target: u32, detector: RepDetector) -> Result<Self> {
        let exercise_kind = exercise_kind.into();
        if target == 0 {
            return Err(Error::Config(format!(
                "Target reps for {} must be positive",
                exercise_kind
            )));
        }

        Ok(Self {
            exercise_kind,
            target,
            detector,
            completions: 0,
        })
    }

    /// Build a session for a catalog exercise
    pub fn for_exercise(definition: &ExerciseDefinition, config: &DetectorConfig) -> Result<Self> {
        Self::new(
            definition.name.clone(),
            definition.reps_required,
            RepDetector::new(config),
        )
    }

    pub fn on_frame(&mut self, landmarks: &LandmarkSet) -> Option<CompletionEvent> {
        self.on_frame_at(landmarks, Utc::now())
    }

    pub fn on_frame_at(
        &mut self,
        landmarks: &LandmarkSet,
        at: DateTime<Utc>,
    ) -> Option<CompletionEvent> {
        self.detector.process_frame_at(landmarks, at);

        let reps = self.detector.reps();
        if reps < self.target {
            return None;
        }

        self.detector.reset();
        self.completions += 1;
        tracing::info!(
            "{} complete: {} reps (completion #{})",
            self.exercise_kind,
            reps,
            self.completions
        );

        Some(CompletionEvent {
            exercise_kind: self.exercise_kind.clone(),
            reps_completed: reps,
        })
    }

    /// Current reps toward the target, and the target
    pub fn progress(&self) -> (u32, u32) {
        (self.detector.reps(), self.target)
    }

    pub fn exercise_kind(&self) -> &str {
        &self.exercise_kind
    }

    pub fn completions(&self) -> u32 {
        self.completions
    }

    pub fn detector(&self) -> &RepDetector {
        &self.detector
    }
}
