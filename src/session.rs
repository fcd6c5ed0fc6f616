//! # Session Aggregation Module
//!
//! Running totals for one training session.
//!
//! ## Lifecycle
//! `Idle` (no session yet) -> `Running` on the first sample or an explicit
//! start. `Running` -> `Paused` on disconnect; the next sample resumes it.
//! `reset` returns to `Idle` with everything zeroed; `start` zeroes and
//! begins running immediately.
//!
//! Counters only grow between resets. The session clock advances on ticks,
//! not on samples, and only while running.

use crate::detector::{DetectionOutcome, PunchEvent, PunchKind};
use crate::physiology::HeartRateZone;
use crate::sensor::Sample;
use std::collections::{HashMap, VecDeque};

/// Punches kept for the rolling average force
const PUNCH_HISTORY_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PunchStats {
    pub last_force: f64,
    /// Highest force this session
    pub max_force: f64,
    /// Mean force over the last 50 punches
    pub average_force: f64,
    pub by_kind: HashMap<PunchKind, u64>,
}

impl Default for PunchStats {
    fn default() -> Self {
        Self {
            last_force: 0.0,
            max_force: 0.0,
            average_force: 0.0,
            by_kind: PunchKind::all().into_iter().map(|kind| (kind, 0)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionAggregate {
    pub punch_count: u64,
    pub block_count: u64,
    pub peak_heart_rate: f64,
    pub session_elapsed_seconds: u64,
    pub calories_burned: f64,
    pub punch_stats: PunchStats,
    /// Seconds spent in each zone, indexed by `HeartRateZone::index`
    pub zone_seconds: [u64; 5],
}

impl SessionAggregate {
    pub fn seconds_in(&self, zone: HeartRateZone) -> u64 {
        self.zone_seconds[zone.index()]
    }

    /// Elapsed time as `MM:SS`
    pub fn elapsed_display(&self) -> String {
        let mins = self.session_elapsed_seconds / 60;
        let secs = self.session_elapsed_seconds % 60;
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Owns the aggregate; the only writer of session totals
pub struct SessionAggregator {
    aggregate: SessionAggregate,
    state: SessionState,
    recent_forces: VecDeque<f64>,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self {
            aggregate: SessionAggregate::default(),
            state: SessionState::Idle,
            recent_forces: VecDeque::with_capacity(PUNCH_HISTORY_LEN),
        }
    }

    pub fn aggregate(&self) -> &SessionAggregate {
        &self.aggregate
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Fold one processed sample into the totals.
    ///
    /// `calories_per_minute` is accrued as one second's worth.
    pub fn record(&mut self, sample: &Sample, outcome: &DetectionOutcome, calories_per_minute: f64) {
        if self.state != SessionState::Running {
            log::info!("Session running");
            self.state = SessionState::Running;
        }

        let agg = &mut self.aggregate;
        if let Some(punch) = outcome.punch {
            agg.punch_count += 1;
            Self::record_punch(&mut agg.punch_stats, &mut self.recent_forces, &punch);
        }
        if outcome.block_detected {
            agg.block_count += 1;
        }
        if sample.heart_rate.is_finite() && sample.heart_rate > agg.peak_heart_rate {
            agg.peak_heart_rate = sample.heart_rate;
        }
        if calories_per_minute.is_finite() && calories_per_minute > 0.0 {
            agg.calories_burned += calories_per_minute / 60.0;
        }
    }

    fn record_punch(stats: &mut PunchStats, recent: &mut VecDeque<f64>, punch: &PunchEvent) {
        if recent.len() == PUNCH_HISTORY_LEN {
            recent.pop_front();
        }
        recent.push_back(punch.force);

        stats.last_force = punch.force;
        stats.max_force = stats.max_force.max(punch.force);
        stats.average_force = recent.iter().sum::<f64>() / recent.len() as f64;
        *stats.by_kind.entry(punch.kind).or_insert(0) += 1;
    }

    /// One second of session clock. `zone` is the zone of the latest reading.
    pub fn tick(&mut self, zone: Option<HeartRateZone>) {
        if self.state != SessionState::Running {
            return;
        }
        self.aggregate.session_elapsed_seconds += 1;
        if let Some(zone) = zone {
            self.aggregate.zone_seconds[zone.index()] += 1;
        }
    }

    /// Begin a fresh session now
    pub fn start(&mut self) {
        self.clear();
        self.state = SessionState::Running;
    }

    /// Zero everything and wait for the next sample
    pub fn reset(&mut self) {
        self.clear();
        self.state = SessionState::Idle;
    }

    /// Stop the clock without losing totals
    pub fn pause(&mut self) {
        if self.state == SessionState::Running {
            self.state = SessionState::Paused;
        }
    }

    fn clear(&mut self) {
        self.aggregate = SessionAggregate::default();
        self.recent_forces.clear();
    }
}
