//! # Event Detector Module
//!
//! Derives discrete events from consecutive glove samples.
//!
//! ## Events
//! - **Punch**: index and middle FSRs both rise by more than the force
//!   threshold since the previous sample. A spike on one finger alone is a
//!   bump, not a punch.
//! - **Block**: impact FSR rises by more than the force threshold.
//! - **Motion**: accelerometer magnitude above `1 + accel_threshold` is
//!   active, otherwise resting. Classified per sample with no debounce, so a
//!   signal hovering at the threshold flaps between states.
//!
//! ## Rolling State
//! Each FSR channel remembers its last finite reading. A NaN reading fires
//! nothing on that channel and leaves the remembered value untouched.
//! A NaN accelerometer keeps the previous motion state.
//!
//! The detector is a stream processor: feeding the same sample twice is
//! processed twice. Deduplication belongs to the relay.

use crate::config::DetectionConfig;
use crate::sensor::Sample;
use std::fmt;

/// Heavy punches with no dominant finger are classed as crosses above this force
const CROSS_FORCE: f64 = 800.0;
/// Strong negative y acceleration marks an uppercut
const UPPERCUT_ACCEL_Y: f64 = -5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    #[default]
    Resting,
    Active,
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionState::Resting => write!(f, "resting"),
            MotionState::Active => write!(f, "active"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PunchKind {
    Jab,
    Cross,
    Hook,
    Uppercut,
}

impl PunchKind {
    pub fn all() -> [PunchKind; 4] {
        [PunchKind::Jab, PunchKind::Cross, PunchKind::Hook, PunchKind::Uppercut]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PunchKind::Jab => "jab",
            PunchKind::Cross => "cross",
            PunchKind::Hook => "hook",
            PunchKind::Uppercut => "uppercut",
        }
    }

    /// Guess the punch type from which sensor took the load and how the
    /// glove was moving.
    pub fn classify(sample: &Sample, force: f64) -> PunchKind {
        let index = sample.fsr_index;
        let middle = sample.fsr_middle;
        let impact = sample.fsr_impact;
        let accel = sample.accelerometer;

        if index > middle && index > impact {
            if accel.x.abs() > accel.y.abs() {
                PunchKind::Jab
            } else {
                PunchKind::Hook
            }
        } else if middle > index && middle > impact {
            PunchKind::Cross
        } else if accel.y < UPPERCUT_ACCEL_Y {
            PunchKind::Uppercut
        } else if force > CROSS_FORCE {
            PunchKind::Cross
        } else {
            PunchKind::Jab
        }
    }
}

/// A detected punch with its rough characteristics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PunchEvent {
    /// Peak FSR reading in the punching sample
    pub force: f64,
    /// Accelerometer magnitude, 0 when unavailable
    pub speed: f64,
    pub kind: PunchKind,
}

impl PunchEvent {
    fn from_sample(sample: &Sample) -> Self {
        let force = [sample.fsr_index, sample.fsr_middle, sample.fsr_impact]
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        let magnitude = sample.accelerometer.magnitude();
        let speed = if magnitude.is_finite() { magnitude } else { 0.0 };

        Self {
            force,
            speed,
            kind: PunchKind::classify(sample, force),
        }
    }
}

/// What one sample produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOutcome {
    pub punch: Option<PunchEvent>,
    pub block_detected: bool,
    pub motion_state: MotionState,
}

impl DetectionOutcome {
    pub fn punch_detected(&self) -> bool {
        self.punch.is_some()
    }
}

/// Last finite reading per FSR channel
#[derive(Debug, Clone, Copy, Default)]
struct ForceBaseline {
    index: Option<f64>,
    middle: Option<f64>,
    impact: Option<f64>,
}

/// Rise of `curr` over `prev`, if both are usable
fn rise(prev: Option<f64>, curr: f64) -> Option<f64> {
    match prev {
        Some(prev) if curr.is_finite() => Some(curr - prev),
        _ => None,
    }
}

/// Replace the remembered reading only with a finite one
fn remember(slot: &mut Option<f64>, curr: f64) {
    if curr.is_finite() {
        *slot = Some(curr);
    }
}

/// Stateless motion classification. `None` when the magnitude is unusable.
pub fn classify_motion(sample: &Sample, accel_threshold: f64) -> Option<MotionState> {
    let magnitude = sample.accelerometer.magnitude();
    if !magnitude.is_finite() {
        return None;
    }
    if magnitude > 1.0 + accel_threshold {
        Some(MotionState::Active)
    } else {
        Some(MotionState::Resting)
    }
}

/// Stateful punch/block/motion detector for one session
pub struct EventDetector {
    force_threshold: f64,
    accel_threshold: f64,
    baseline: ForceBaseline,
    motion_state: MotionState,
}

impl EventDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            force_threshold: config.force_threshold,
            accel_threshold: config.accel_threshold,
            baseline: ForceBaseline::default(),
            motion_state: MotionState::Resting,
        }
    }

    /// Process the next sample in arrival order
    pub fn process(&mut self, curr: &Sample) -> DetectionOutcome {
        let index_rise = rise(self.baseline.index, curr.fsr_index);
        let middle_rise = rise(self.baseline.middle, curr.fsr_middle);
        let impact_rise = rise(self.baseline.impact, curr.fsr_impact);

        let punch_detected = matches!(
            (index_rise, middle_rise),
            (Some(i), Some(m)) if i > self.force_threshold && m > self.force_threshold
        );
        let block_detected = matches!(impact_rise, Some(d) if d > self.force_threshold);

        if let Some(state) = classify_motion(curr, self.accel_threshold) {
            if state != self.motion_state {
                log::debug!("Motion state: {} -> {}", self.motion_state, state);
            }
            self.motion_state = state;
        }

        remember(&mut self.baseline.index, curr.fsr_index);
        remember(&mut self.baseline.middle, curr.fsr_middle);
        remember(&mut self.baseline.impact, curr.fsr_impact);

        DetectionOutcome {
            punch: punch_detected.then(|| PunchEvent::from_sample(curr)),
            block_detected,
            motion_state: self.motion_state,
        }
    }

    pub fn motion_state(&self) -> MotionState {
        self.motion_state
    }

    /// True once any FSR channel has a remembered reading
    #[cfg(test)]
    pub fn has_previous(&self) -> bool {
        self.baseline.index.is_some() || self.baseline.middle.is_some() || self.baseline.impact.is_some()
    }

    /// Forget the previous sample, as at the start of a new session
    pub fn reset(&mut self) {
        self.baseline = ForceBaseline::default();
        self.motion_state = MotionState::Resting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::sample_at;

    fn detector() -> EventDetector {
        EventDetector::new(&DetectionConfig::default())
    }

    fn fsr(index: f64, middle: f64, impact: f64) -> Sample {
        sample_at((index, middle, impact), (0.0, 0.0, 0.0), 80.0)
    }

    #[test]
    fn test_first_sample_never_fires() {
        let mut d = detector();
        let outcome = d.process(&fsr(900.0, 900.0, 900.0));
        assert!(!outcome.punch_detected());
        assert!(!outcome.block_detected);
        assert!(d.has_previous());
    }

    #[test]
    fn test_punch_needs_both_fingers() {
        let mut d = detector();
        d.process(&fsr(100.0, 100.0, 0.0));
        let outcome = d.process(&fsr(350.0, 340.0, 0.0));
        assert!(outcome.punch_detected());
        assert!(!outcome.block_detected);

        let mut d = detector();
        d.process(&fsr(100.0, 100.0, 0.0));
        let outcome = d.process(&fsr(350.0, 120.0, 0.0));
        assert!(!outcome.punch_detected());
    }

    #[test]
    fn test_rise_must_exceed_threshold() {
        let mut d = detector();
        d.process(&fsr(100.0, 100.0, 100.0));
        let outcome = d.process(&fsr(300.0, 300.0, 300.0));
        assert!(!outcome.punch_detected());
        assert!(!outcome.block_detected);
    }

    #[test]
    fn test_block_from_impact_sensor() {
        let mut d = detector();
        d.process(&fsr(0.0, 0.0, 50.0));
        let outcome = d.process(&fsr(0.0, 0.0, 300.0));
        assert!(outcome.block_detected);
        assert!(!outcome.punch_detected());
    }

    #[test]
    fn test_falling_force_is_not_an_event() {
        let mut d = detector();
        d.process(&fsr(900.0, 900.0, 900.0));
        let outcome = d.process(&fsr(0.0, 0.0, 0.0));
        assert!(!outcome.punch_detected());
        assert!(!outcome.block_detected);
    }

    #[test]
    fn test_motion_classification() {
        let mut d = detector();
        let still = sample_at((0.0, 0.0, 0.0), (0.0, 0.0, 0.0), 70.0);
        assert_eq!(d.process(&still).motion_state, MotionState::Resting);

        let moving = sample_at((0.0, 0.0, 0.0), (2.0, 0.0, 0.0), 70.0);
        assert_eq!(d.process(&moving).motion_state, MotionState::Active);

        let edge = sample_at((0.0, 0.0, 0.0), (1.5, 0.0, 0.0), 70.0);
        assert_eq!(d.process(&edge).motion_state, MotionState::Resting);
    }

    #[test]
    fn test_nan_channel_keeps_previous_reading() {
        let mut d = detector();
        d.process(&fsr(100.0, 100.0, 50.0));

        let gap = fsr(f64::NAN, 500.0, f64::NAN);
        let outcome = d.process(&gap);
        assert!(!outcome.punch_detected());
        assert!(!outcome.block_detected);

        // Index still compares against 100, middle against 500
        let outcome = d.process(&fsr(400.0, 800.0, 300.0));
        assert!(outcome.punch_detected());
        assert!(outcome.block_detected);
    }

    #[test]
    fn test_nan_accelerometer_keeps_motion_state() {
        let mut d = detector();
        d.process(&sample_at((0.0, 0.0, 0.0), (3.0, 0.0, 0.0), 70.0));
        let outcome = d.process(&sample_at((0.0, 0.0, 0.0), (f64::NAN, 0.0, 0.0), 70.0));
        assert_eq!(outcome.motion_state, MotionState::Active);
    }

    #[test]
    fn test_reset_clears_previous() {
        let mut d = detector();
        d.process(&fsr(100.0, 100.0, 100.0));
        d.reset();
        assert!(!d.has_previous());
        let outcome = d.process(&fsr(900.0, 900.0, 900.0));
        assert!(!outcome.punch_detected());
    }

    #[test]
    fn test_duplicate_sample_processed_twice() {
        let mut d = detector();
        d.process(&fsr(0.0, 0.0, 0.0));
        let spike = fsr(500.0, 500.0, 0.0);
        assert!(d.process(&spike).punch_detected());
        // Same reading again has no rise, so no second punch
        assert!(!d.process(&spike).punch_detected());
    }

    #[test]
    fn test_punch_characteristics() {
        let mut d = detector();
        d.process(&fsr(0.0, 0.0, 0.0));
        let jab = sample_at((700.0, 400.0, 100.0), (3.0, 1.0, 0.0), 120.0);
        let punch = d.process(&jab).punch.expect("punch expected");
        assert_eq!(punch.force, 700.0);
        assert_eq!(punch.kind, PunchKind::Jab);
        assert!((punch.speed - 10.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_punch_kind_heuristics() {
        let hook = sample_at((700.0, 400.0, 100.0), (1.0, 3.0, 0.0), 0.0);
        assert_eq!(PunchKind::classify(&hook, 700.0), PunchKind::Hook);

        let cross = sample_at((400.0, 700.0, 100.0), (0.0, 0.0, 0.0), 0.0);
        assert_eq!(PunchKind::classify(&cross, 700.0), PunchKind::Cross);

        let uppercut = sample_at((500.0, 500.0, 500.0), (0.0, -6.0, 0.0), 0.0);
        assert_eq!(PunchKind::classify(&uppercut, 500.0), PunchKind::Uppercut);

        let heavy = sample_at((900.0, 900.0, 900.0), (0.0, 0.0, 0.0), 0.0);
        assert_eq!(PunchKind::classify(&heavy, 900.0), PunchKind::Cross);

        let light = sample_at((500.0, 500.0, 500.0), (0.0, 0.0, 0.0), 0.0);
        assert_eq!(PunchKind::classify(&light, 500.0), PunchKind::Jab);
    }
}
