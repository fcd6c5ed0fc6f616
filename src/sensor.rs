//! # Glove Sensor Data Module
//!
//! The canonical sample shape produced by the glove and the update messages
//! that sources (the relay transport or the mock generator) send to the
//! dashboard thread.
//!
//! ## Key Types
//! - `Sample`: One instantaneous reading: heart rate, three FSRs, accelerometer
//! - `SensorUpdate`: What a source reports (lifecycle events, frames, samples)
//! - `SourceUpdate`: A `SensorUpdate` tagged with the generation of its source
//! - `SourceLink`: Sending half handed to a source task

use crate::error::ConnectionError;
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::Serialize;

/// Linear acceleration in device units, signed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Accelerometer {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Accelerometer {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean magnitude. NaN if any axis is missing.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One reading from the glove.
///
/// Channels the device did not report are NaN. Consumers treat NaN as
/// "no reading" for that channel rather than as a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub heart_rate: f64,
    pub fsr_index: f64,
    pub fsr_middle: f64,
    pub fsr_impact: f64,
    pub accelerometer: Accelerometer,
    pub timestamp: DateTime<Utc>,
}

/// Updates sent from a source task to the dashboard thread
#[derive(Debug)]
pub enum SensorUpdate {
    /// Transport handshake completed
    Opened,
    /// Raw text frame from the relay, parsed by the ingress
    Frame(String),
    /// Synthetic sample from the mock generator
    Sample(Sample),
    /// Transport closed
    Closed,
    /// Transport failed
    Failed(ConnectionError),
}

/// A `SensorUpdate` stamped with the generation of the source that sent it.
///
/// The dashboard drops updates whose generation is no longer current, so a
/// source that has been replaced cannot touch session state.
#[derive(Debug)]
pub struct SourceUpdate {
    pub generation: u64,
    pub update: SensorUpdate,
}

/// Sending half given to each source task
#[derive(Clone)]
pub struct SourceLink {
    generation: u64,
    sender: Sender<SourceUpdate>,
}

impl SourceLink {
    pub fn new(generation: u64, sender: Sender<SourceUpdate>) -> Self {
        Self { generation, sender }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Send an update to the dashboard.
    ///
    /// Returns false once the dashboard side has hung up, so source loops can
    /// exit early.
    pub fn send(&self, update: SensorUpdate) -> bool {
        let tagged = SourceUpdate {
            generation: self.generation,
            update,
        };
        if let Err(why) = self.sender.send(tagged) {
            log::debug!("Source {}: dashboard hung up: {:?}", self.generation, why.0.update);
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) fn sample_at(fsr: (f64, f64, f64), accel: (f64, f64, f64), heart_rate: f64) -> Sample {
    Sample {
        heart_rate,
        fsr_index: fsr.0,
        fsr_middle: fsr.1,
        fsr_impact: fsr.2,
        accelerometer: Accelerometer::new(accel.0, accel.1, accel.2),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accelerometer_magnitude() {
        assert_eq!(Accelerometer::new(0.0, 0.0, 0.0).magnitude(), 0.0);
        assert_eq!(Accelerometer::new(3.0, 4.0, 0.0).magnitude(), 5.0);
        assert!(Accelerometer::new(f64::NAN, 0.0, 0.0).magnitude().is_nan());
    }

    #[test]
    fn test_sample_serializes_camel_case() {
        let sample = sample_at((100.0, 200.0, 300.0), (0.0, 1.0, 0.0), 72.0);
        let json = serde_json::to_string(&sample).expect("Failed to serialize");
        assert!(json.contains("\"heartRate\":72.0"));
        assert!(json.contains("\"fsrImpact\":300.0"));
    }

    #[test]
    fn test_link_tags_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let link = SourceLink::new(7, tx);
        assert!(link.send(SensorUpdate::Opened));

        let update = rx.try_recv().expect("update should be queued");
        assert_eq!(update.generation, 7);
        assert!(matches!(update.update, SensorUpdate::Opened));
    }

    #[test]
    fn test_link_reports_hangup() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let link = SourceLink::new(1, tx);
        drop(rx);
        assert!(!link.send(SensorUpdate::Closed));
    }
}
