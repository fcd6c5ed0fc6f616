//! # Sample Ingress Module
//!
//! Turns relay text frames into typed messages and keeps a bounded log of
//! everything that crossed the wire for diagnostic display.
//!
//! ## Wire Format
//! ```text
//! { "type": "data",   "data": Sample, "timestamp": ISO8601 }
//! { "type": "status", "connected": bool, "message": string, "timestamp": ISO8601 }
//! { "type": "command", "command": "toggleMock" | "reconnect" | "sendToArduino", "value"?: string }
//! ```
//! The first two are inbound, the last is outbound.
//!
//! Sample fields are camelCase. A missing or null sensor field becomes NaN.
//! A payload with no sensor fields at all (the relay wraps lines it cannot
//! parse as `{ "raw": "..." }`) is malformed.

use crate::error::MalformedSampleError;
use crate::sensor::{Accelerometer, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounds on the raw message log capacity
pub const MIN_LOG_CAPACITY: usize = 50;
pub const MAX_LOG_CAPACITY: usize = 100;

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Data(Sample),
    Status { connected: bool, message: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Envelope {
    Data {
        data: serde_json::Value,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Status {
        connected: bool,
        #[serde(default)]
        message: String,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WireAccelerometer {
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSample {
    heart_rate: Option<f64>,
    fsr_index: Option<f64>,
    fsr_middle: Option<f64>,
    fsr_impact: Option<f64>,
    accelerometer: Option<WireAccelerometer>,
    timestamp: Option<String>,
}

impl WireSample {
    fn has_sensor_fields(&self) -> bool {
        self.heart_rate.is_some()
            || self.fsr_index.is_some()
            || self.fsr_middle.is_some()
            || self.fsr_impact.is_some()
            || self.accelerometer.is_some()
    }

    fn into_sample(self, fallback_time: DateTime<Utc>) -> Sample {
        let accel = self.accelerometer.unwrap_or_default();
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback_time);

        Sample {
            heart_rate: self.heart_rate.unwrap_or(f64::NAN),
            fsr_index: self.fsr_index.unwrap_or(f64::NAN),
            fsr_middle: self.fsr_middle.unwrap_or(f64::NAN),
            fsr_impact: self.fsr_impact.unwrap_or(f64::NAN),
            accelerometer: Accelerometer::new(
                accel.x.unwrap_or(f64::NAN),
                accel.y.unwrap_or(f64::NAN),
                accel.z.unwrap_or(f64::NAN),
            ),
            timestamp,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            log::debug!("Ignoring unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

/// Parse one relay frame.
///
/// `received_at` stamps samples when neither the payload nor the envelope
/// carries a usable timestamp.
pub fn parse_frame(raw: &str, received_at: DateTime<Utc>) -> Result<Inbound, MalformedSampleError> {
    let envelope: Envelope = serde_json::from_str(raw)
        .map_err(|e| MalformedSampleError::new(raw, format!("bad envelope: {}", e)))?;

    match envelope {
        Envelope::Status { connected, message } => Ok(Inbound::Status { connected, message }),
        Envelope::Data { data, timestamp } => {
            if !data.is_object() {
                return Err(MalformedSampleError::new(raw, "data payload is not an object"));
            }
            let wire: WireSample = serde_json::from_value(data)
                .map_err(|e| MalformedSampleError::new(raw, format!("bad sample: {}", e)))?;
            if !wire.has_sensor_fields() {
                return Err(MalformedSampleError::new(raw, "no sensor fields"));
            }

            let fallback = timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(received_at);
            Ok(Inbound::Data(wire.into_sample(fallback)))
        }
    }
}

/// Commands the relay understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandName {
    ToggleMock,
    Reconnect,
    SendToArduino,
}

/// Outbound command frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "command")]
pub struct OutboundCommand {
    pub command: CommandName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl OutboundCommand {
    pub fn new(command: CommandName) -> Self {
        Self { command, value: None }
    }

    /// Forward a line of text to the glove firmware through the relay
    pub fn send_to_arduino(value: impl Into<String>) -> Self {
        Self {
            command: CommandName::SendToArduino,
            value: Some(value.into()),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain struct of strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Category of a raw log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Data,
    Status,
    Error,
    Command,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub kind: RawKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded log of the most recent raw messages, oldest first
#[derive(Debug)]
pub struct RawMessageLog {
    entries: VecDeque<RawEntry>,
    capacity: usize,
}

impl RawMessageLog {
    /// Capacity is clamped to `MIN_LOG_CAPACITY..=MAX_LOG_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(MIN_LOG_CAPACITY, MAX_LOG_CAPACITY);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, kind: RawKind, content: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RawEntry {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &RawEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Front door for everything a source delivers.
///
/// Every frame is logged before it is interpreted, so malformed input still
/// shows up in the diagnostic view.
pub struct Ingress {
    log: RawMessageLog,
}

impl Ingress {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            log: RawMessageLog::new(log_capacity),
        }
    }

    /// Accept a text frame from the relay
    pub fn accept_frame(&mut self, raw: &str) -> Result<Inbound, MalformedSampleError> {
        match parse_frame(raw, Utc::now()) {
            Ok(inbound) => {
                let kind = match inbound {
                    Inbound::Data(_) => RawKind::Data,
                    Inbound::Status { .. } => RawKind::Status,
                };
                self.log.push(kind, raw);
                Ok(inbound)
            }
            Err(e) => {
                self.log.push(RawKind::Error, e.to_string());
                Err(e)
            }
        }
    }

    /// Accept a sample that did not arrive as text (mock generator)
    pub fn accept_sample(&mut self, sample: Sample) -> Sample {
        let content = serde_json::to_string(&sample).unwrap_or_else(|e| format!("<{}>", e));
        self.log.push(RawKind::Data, content);
        sample
    }

    pub fn record(&mut self, kind: RawKind, content: impl Into<String>) {
        self.log.push(kind, content);
    }

    pub fn log(&self) -> &RawMessageLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_parse_data_frame() {
        let raw = r#"{"type":"data","data":{"heartRate":120,"fsrIndex":350,"fsrMiddle":340,"fsrImpact":12,
            "accelerometer":{"x":1.5,"y":-0.5,"z":0.2},"punchCount":4},"timestamp":"2024-05-01T10:00:00Z"}"#;

        match parse_frame(raw, now()).expect("frame should parse") {
            Inbound::Data(sample) => {
                assert_eq!(sample.heart_rate, 120.0);
                assert_eq!(sample.fsr_index, 350.0);
                assert_eq!(sample.fsr_middle, 340.0);
                assert_eq!(sample.fsr_impact, 12.0);
                assert_eq!(sample.accelerometer.y, -0.5);
                assert_eq!(sample.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
            }
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_timestamp_preferred_over_envelope() {
        let raw = r#"{"type":"data","data":{"heartRate":80,"timestamp":"2024-05-01T10:00:05Z"},
            "timestamp":"2024-05-01T10:00:00Z"}"#;
        let Inbound::Data(sample) = parse_frame(raw, now()).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(sample.timestamp.to_rfc3339(), "2024-05-01T10:00:05+00:00");
    }

    #[test]
    fn test_missing_timestamp_uses_receipt_time() {
        let received = DateTime::parse_from_rfc3339("2024-06-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let raw = r#"{"type":"data","data":{"heartRate":80}}"#;
        let Inbound::Data(sample) = parse_frame(raw, received).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(sample.timestamp, received);
    }

    #[test]
    fn test_missing_fields_become_nan() {
        let raw = r#"{"type":"data","data":{"heartRate":90,"fsrIndex":null}}"#;
        let Inbound::Data(sample) = parse_frame(raw, now()).unwrap() else {
            panic!("expected data");
        };
        assert_eq!(sample.heart_rate, 90.0);
        assert!(sample.fsr_index.is_nan());
        assert!(sample.fsr_impact.is_nan());
        assert!(sample.accelerometer.magnitude().is_nan());
    }

    #[test]
    fn test_parse_status_frame() {
        let raw = r#"{"type":"status","connected":false,"message":"Waiting for device","timestamp":"2024-05-01T10:00:00Z"}"#;
        assert_eq!(
            parse_frame(raw, now()).unwrap(),
            Inbound::Status {
                connected: false,
                message: "Waiting for device".to_string()
            }
        );
    }

    #[test]
    fn test_relay_raw_fallback_is_malformed() {
        let raw = r#"{"type":"data","data":{"raw":"HR:72 F1:300"}}"#;
        let err = parse_frame(raw, now()).unwrap_err();
        assert_eq!(err.raw, raw);
        assert_eq!(err.reason, "no sensor fields");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(parse_frame("not json", now()).is_err());
        assert!(parse_frame(r#"{"type":"bogus"}"#, now()).is_err());
        assert!(parse_frame(r#"{"type":"data","data":42}"#, now()).is_err());
        assert!(parse_frame(r#"{"type":"data","data":{"heartRate":"fast"}}"#, now()).is_err());
    }

    #[test]
    fn test_outbound_command_json() {
        let cmd = OutboundCommand::new(CommandName::ToggleMock);
        assert_eq!(cmd.to_json(), r#"{"type":"command","command":"toggleMock"}"#);

        let cmd = OutboundCommand::send_to_arduino("CAL");
        assert_eq!(
            cmd.to_json(),
            r#"{"type":"command","command":"sendToArduino","value":"CAL"}"#
        );
    }

    #[test]
    fn test_log_is_bounded() {
        let mut log = RawMessageLog::new(100);
        for i in 0..150 {
            log.push(RawKind::Data, format!("msg {}", i));
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.entries().next().unwrap().content, "msg 50");
        assert_eq!(log.entries().last().unwrap().content, "msg 149");
    }

    #[test]
    fn test_log_capacity_clamped() {
        assert_eq!(RawMessageLog::new(0).capacity(), MIN_LOG_CAPACITY);
        assert_eq!(RawMessageLog::new(10_000).capacity(), MAX_LOG_CAPACITY);
        assert_eq!(RawMessageLog::new(64).capacity(), 64);
    }

    #[test]
    fn test_ingress_logs_malformed_frames() {
        let mut ingress = Ingress::new(100);
        assert!(ingress.accept_frame("{oops").is_err());
        assert!(ingress
            .accept_frame(r#"{"type":"data","data":{"heartRate":70}}"#)
            .is_ok());

        let kinds: Vec<RawKind> = ingress.log().entries().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![RawKind::Error, RawKind::Data]);
    }
}
