//! # Mock Data Module
//!
//! Synthetic glove samples for running the dashboard without hardware.
//! Ranges match what the glove firmware reports: heart rate 60-159 bpm,
//! FSRs 0-1023, accelerometer axes -10.0 to 9.9 in 0.1 steps.

use crate::sensor::{Accelerometer, Sample, SensorUpdate, SourceLink};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct MockGenerator {
    rng: StdRng,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator for tests
    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn axis(&mut self) -> f64 {
        self.rng.gen_range(-100..100) as f64 / 10.0
    }

    pub fn next_sample(&mut self) -> Sample {
        Sample {
            heart_rate: self.rng.gen_range(60..160) as f64,
            fsr_index: self.rng.gen_range(0..1024) as f64,
            fsr_middle: self.rng.gen_range(0..1024) as f64,
            fsr_impact: self.rng.gen_range(0..1024) as f64,
            accelerometer: Accelerometer::new(self.axis(), self.axis(), self.axis()),
            timestamp: Utc::now(),
        }
    }
}

/// Emit one synthetic sample per `interval` until `should_stop` is set or
/// the dashboard hangs up.
pub async fn run_mock_source(link: SourceLink, interval: Duration, should_stop: Arc<AtomicBool>) {
    log::info!("Mock source {}: started ({} ms)", link.generation(), interval.as_millis());
    let mut generator = MockGenerator::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        if should_stop.load(Ordering::Relaxed) {
            break;
        }
        if !link.send(SensorUpdate::Sample(generator.next_sample())) {
            break;
        }
    }

    log::info!("Mock source {}: stopped", link.generation());
}
