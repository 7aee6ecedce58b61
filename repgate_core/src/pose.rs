//! Per-frame posture classification for jumping jacks.
//!
//! Each frame is reduced to two joint-pair predicates:
//! - Arms: are the wrists above the shoulder line by a margin?
//! - Legs: are the ankles spread wider than the hips by a ratio?
//!
//! Both predicates agreeing gives `Up` or `Down`; disagreement gives
//! `Transition`. When the lower body is not visible the classifier falls
//! back to the arm predicate alone.

use crate::config::DetectorConfig;
use crate::types::*;

/// Arm configuration derived from the wrist/shoulder pairs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arms {
    Raised,
    Lowered,
    Mixed,
}

/// Leg configuration derived from the ankle/hip pairs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Legs {
    Apart,
    Together,
}

/// Stateless classifier holding the geometric thresholds
#[derive(Clone, Debug)]
pub struct PoseClassifier {
    min_visibility: f32,
    wrist_margin: f32,
    ankle_spread_ratio: f32,
}

impl Default for PoseClassifier {
    fn default() -> Self {
        Self::new(&DetectorConfig::default())
    }
}

impl PoseClassifier {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            min_visibility: config.min_visibility,
            wrist_margin: config.wrist_margin,
            ankle_spread_ratio: config.ankle_spread_ratio,
        }
    }

    /// Classify one frame. Never fails: unusable frames are `Unknown`.
    pub fn classify(&self, landmarks: &LandmarkSet) -> PostureState {
        if let Err(e) = landmarks.validate() {
            tracing::debug!("Treating frame as unknown: {}", e);
            return PostureState::Unknown;
        }

        let Some(arms) = self.arms(landmarks) else {
            return PostureState::Unknown;
        };

        match (arms, self.legs(landmarks)) {
            (Arms::Raised, Some(Legs::Apart)) => PostureState::Up,
            (Arms::Lowered, Some(Legs::Together)) => PostureState::Down,
            (_, Some(_)) => PostureState::Transition,

            // Upper-body-only mode
            (Arms::Raised, None) => PostureState::Up,
            (Arms::Lowered, None) => PostureState::Down,
            (Arms::Mixed, None) => PostureState::Transition,
        }
    }

    /// Arm predicate, or None if a shoulder or wrist is unavailable
    pub fn arms(&self, landmarks: &LandmarkSet) -> Option<Arms> {
        let left_shoulder = self.available(landmarks, LEFT_SHOULDER)?;
        let right_shoulder = self.available(landmarks, RIGHT_SHOULDER)?;
        let left_wrist = self.available(landmarks, LEFT_WRIST)?;
        let right_wrist = self.available(landmarks, RIGHT_WRIST)?;

        // Image y grows downwards: "above" means a smaller y.
        let shoulder_line = left_shoulder.y.min(right_shoulder.y);
        let threshold = shoulder_line - self.wrist_margin;
        let raised = [left_wrist, right_wrist]
            .iter()
            .filter(|w| w.y < threshold)
            .count();

        Some(match raised {
            2 => Arms::Raised,
            0 => Arms::Lowered,
            _ => Arms::Mixed,
        })
    }

    /// Leg predicate, or None if a hip or ankle is unavailable
    pub fn legs(&self, landmarks: &LandmarkSet) -> Option<Legs> {
        let left_hip = self.available(landmarks, LEFT_HIP)?;
        let right_hip = self.available(landmarks, RIGHT_HIP)?;
        let left_ankle = self.available(landmarks, LEFT_ANKLE)?;
        let right_ankle = self.available(landmarks, RIGHT_ANKLE)?;

        let hip_width = (left_hip.x - right_hip.x).abs();
        let ankle_spread = (left_ankle.x - right_ankle.x).abs();

        if ankle_spread > self.ankle_spread_ratio * hip_width {
            Some(Legs::Apart)
        } else {
            Some(Legs::Together)
        }
    }

    fn available<'a>(&self, landmarks: &'a LandmarkSet, index: usize) -> Option<&'a Landmark> {
        landmarks
            .get(index)
            .filter(|l| l.visibility >= self.min_visibility)
    }
}
