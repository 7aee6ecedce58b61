//! Debounced rep counting over classified postures.
//!
//! The detector is a small state machine over [`PostureState`]. A rep is a
//! full debounced cycle: an accepted change into `Up` arms the counter, and
//! the next accepted change into `Down` counts it. Changes arriving sooner
//! than the debounce interval after the previous accepted change are dropped,
//! so fast oscillation between postures never reads as reps.

use crate::config::DetectorConfig;
use crate::pose::PoseClassifier;
use crate::types::{LandmarkSet, PostureState};
use chrono::{DateTime, Duration, Utc};

/// What a single observation did to the detector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Unknown posture or same as current state
    Ignored,
    /// Changed posture arrived inside the debounce window
    Debounced,
    /// Posture change accepted
    Accepted,
    /// Posture change accepted and completed a rep
    RepCounted,
}

/// Effect of an accepted transition on the rep bookkeeping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Effect {
    None,
    ArmExtended,
    CountIfArmed,
}

/// Transition table: what an accepted change into `to` does
fn effect_of(to: PostureState) -> Effect {
    match to {
        PostureState::Up => Effect::ArmExtended,
        PostureState::Down => Effect::CountIfArmed,
        PostureState::Transition | PostureState::Unknown => Effect::None,
    }
}

/// Rep counting state machine for a single frame timeline
#[derive(Clone, Debug)]
pub struct RepDetector {
    classifier: PoseClassifier,
    debounce: Duration,
    state: PostureState,
    reps: u32,
    reached_extended: bool,
    last_change: Option<DateTime<Utc>>,
}

impl Default for RepDetector {
    fn default() -> Self {
        Self::new(&DetectorConfig::default())
    }
}

impl RepDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            classifier: PoseClassifier::new(config),
            debounce: config.debounce(),
            state: PostureState::Unknown,
            reps: 0,
            reached_extended: false,
            last_change: None,
        }
    }

    /// Classify and observe a frame captured now
    pub fn process_frame(&mut self, landmarks: &LandmarkSet) -> FrameOutcome {
        self.process_frame_at(landmarks, Utc::now())
    }

    /// Classify and observe a frame captured at `at`
    pub fn process_frame_at(&mut self, landmarks: &LandmarkSet, at: DateTime<Utc>) -> FrameOutcome {
        let posture = self.classifier.classify(landmarks);
        self.observe(posture, at)
    }

    /// Feed an already-classified posture into the state machine
    pub fn observe(&mut self, posture: PostureState, at: DateTime<Utc>) -> FrameOutcome {
        if posture == PostureState::Unknown || posture == self.state {
            return FrameOutcome::Ignored;
        }

        if let Some(last) = self.last_change {
            if at - last < self.debounce {
                tracing::trace!(
                    "Dropped {:?} -> {:?}: {}ms since last change",
                    self.state,
                    posture,
                    (at - last).num_milliseconds()
                );
                return FrameOutcome::Debounced;
            }
        }

        tracing::trace!("Posture {:?} -> {:?}", self.state, posture);
        self.state = posture;
        self.last_change = Some(at);

        match effect_of(posture) {
            Effect::ArmExtended => {
                self.reached_extended = true;
                FrameOutcome::Accepted
            }
            Effect::CountIfArmed if self.reached_extended => {
                self.reached_extended = false;
                self.reps += 1;
                tracing::debug!("Rep {} counted", self.reps);
                FrameOutcome::RepCounted
            }
            Effect::CountIfArmed | Effect::None => FrameOutcome::Accepted,
        }
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn state(&self) -> PostureState {
        self.state
    }

    /// Return to the initial state with zero reps
    pub fn reset(&mut self) {
        self.state = PostureState::Unknown;
        self.reps = 0;
        self.reached_extended = false;
        self.last_change = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::fixtures;
    use PostureState::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    /// Observe postures spaced `gap_ms` apart
    fn run(detector: &mut RepDetector, postures: &[PostureState], gap_ms: i64) {
        for (i, p) in postures.iter().enumerate() {
            detector.observe(*p, t(i as i64 * gap_ms));
        }
    }

    #[test]
    fn test_down_up_down_is_one_rep() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Down, Up, Down], 500);
        assert_eq!(detector.reps(), 1);
        assert_eq!(detector.state(), Down);
    }

    #[test]
    fn test_down_only_counts_nothing() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Down, Down, Down], 600);
        assert_eq!(detector.reps(), 0);
    }

    #[test]
    fn test_duplicate_up_does_not_double_count() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Down, Up, Up, Down], 600);
        assert_eq!(detector.reps(), 1);
    }

    #[test]
    fn test_fast_opposite_frames_are_debounced() {
        let mut detector = RepDetector::default();
        assert_eq!(detector.observe(Down, t(0)), FrameOutcome::Accepted);
        assert_eq!(detector.observe(Up, t(600)), FrameOutcome::Accepted);
        assert_eq!(detector.observe(Down, t(700)), FrameOutcome::Debounced);
        assert_eq!(detector.state(), Up);
        assert_eq!(detector.reps(), 0);

        // Once the interval elapses the change goes through
        assert_eq!(detector.observe(Down, t(1100)), FrameOutcome::RepCounted);
        assert_eq!(detector.reps(), 1);
    }

    #[test]
    fn test_unknown_frames_do_not_reset_debounce() {
        let mut detector = RepDetector::default();
        detector.observe(Down, t(0));
        assert_eq!(detector.observe(Unknown, t(400)), FrameOutcome::Ignored);
        assert_eq!(detector.state(), Down);
        // Measured from the Down at t=0, not the Unknown at t=400
        assert_eq!(detector.observe(Up, t(500)), FrameOutcome::Accepted);
    }

    #[test]
    fn test_transition_never_counts_or_disarms() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Down, Transition, Up, Transition, Down], 500);
        assert_eq!(detector.reps(), 1);
    }

    #[test]
    fn test_up_transition_up_down_counts_once() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Up, Transition, Up, Down], 500);
        assert_eq!(detector.reps(), 1);
    }

    #[test]
    fn test_rapid_wiggle_is_not_a_rep() {
        let mut detector = RepDetector::default();
        detector.observe(Down, t(0));
        for i in 1..20 {
            let p = if i % 2 == 0 { Down } else { Up };
            detector.observe(p, t(i * 100));
        }
        // Only changes at >=500ms spacing are accepted
        assert!(detector.reps() <= 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut detector = RepDetector::default();
        run(&mut detector, &[Down, Up, Down], 500);
        detector.reset();
        assert_eq!(detector.reps(), 0);
        assert_eq!(detector.state(), Unknown);
        // No pending debounce after reset
        assert_eq!(detector.observe(Up, t(1001)), FrameOutcome::Accepted);
    }

    #[test]
    fn test_process_frames_from_landmarks() {
        let mut detector = RepDetector::default();
        detector.process_frame_at(&fixtures::down(), t(0));
        detector.process_frame_at(&fixtures::up(), t(500));
        let outcome = detector.process_frame_at(&fixtures::down(), t(1000));
        assert_eq!(outcome, FrameOutcome::RepCounted);
        assert_eq!(detector.reps(), 1);
    }

    #[test]
    fn test_custom_debounce_interval() {
        let config = DetectorConfig {
            debounce_ms: 100,
            ..DetectorConfig::default()
        };
        let mut detector = RepDetector::new(&config);
        run(&mut detector, &[Down, Up, Down], 100);
        assert_eq!(detector.reps(), 1);
    }
}
