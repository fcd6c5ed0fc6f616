//! # Dashboard Module
//!
//! The session context. Owns the connection state machine, ingress, event
//! detector, profile and session aggregator, and is the only place any of
//! them is mutated. Everything happens on one thread through `update`, one
//! message at a time.
//!
//! ## Flow
//! ```text
//! source update -> generation check -> ingress -> detector + physiology -> aggregator
//! user action   -> state machine -> ConnectionCommand -> worker thread
//! clock tick    -> aggregator.tick
//! ```

use crate::config::Config;
use crate::connection::{ConnectionCommand, ConnectionMachine, ConnectionStatus, TransportEvent};
use crate::detector::{EventDetector, MotionState, PunchKind};
use crate::error::ConnectionError;
use crate::ingress::{Inbound, Ingress, OutboundCommand, RawKind, RawMessageLog};
use crate::physiology::{calories_for_profile, heart_rate_zone, zone_thresholds, HeartRateZone, UserProfile};
use crate::sensor::{Sample, SensorUpdate, SourceUpdate};
use crate::session::{SessionAggregate, SessionAggregator, SessionState};
use crossbeam_channel::{Receiver, Sender};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Message {
    /// Drain pending source updates
    Tick,
    /// One second of session clock
    ClockTick,
    Connect,
    Disconnect,
    ToggleMockData,
    StartSession,
    ResetSession,
    SendCommand(OutboundCommand),
    UpdateProfile(UserProfile),
}

pub struct Dashboard {
    receiver: Receiver<SourceUpdate>,
    command_sender: Sender<ConnectionCommand>,
    relay_url: String,
    mock_interval: Duration,
    machine: ConnectionMachine,
    ingress: Ingress,
    detector: EventDetector,
    session: SessionAggregator,
    profile: UserProfile,
    current: Option<Sample>,
    zone: Option<HeartRateZone>,
}

impl Dashboard {
    pub fn new(
        config: &Config,
        receiver: Receiver<SourceUpdate>,
        command_sender: Sender<ConnectionCommand>,
    ) -> Self {
        if let Err(e) = config.profile.validate() {
            log::warn!("{}; heart-rate zones and calories disabled until the profile is fixed", e);
        }

        Dashboard {
            receiver,
            command_sender,
            relay_url: config.relay_url.clone(),
            mock_interval: Duration::from_millis(config.mock_interval_ms.max(1)),
            machine: ConnectionMachine::new(),
            ingress: Ingress::new(config.raw_log_capacity),
            detector: EventDetector::new(&config.detection),
            session: SessionAggregator::new(),
            profile: config.profile.clone(),
            current: None,
            zone: None,
        }
    }

    pub fn update(&mut self, message: Message) {
        match message {
            Message::Tick => {
                // Process all pending updates without blocking
                while let Ok(update) = self.receiver.try_recv() {
                    self.handle_source_update(update);
                }
            }
            Message::ClockTick => {
                self.session.tick(self.zone);
            }
            Message::Connect => {
                let command = self.machine.connect(&self.relay_url);
                self.ingress.record(RawKind::Status, format!("Connecting to {}", self.relay_url));
                self.dispatch(command);
            }
            Message::Disconnect => {
                let command = self.machine.disconnect();
                self.session.pause();
                self.ingress.record(RawKind::Status, "Disconnected by user");
                self.dispatch(command);
            }
            Message::ToggleMockData => {
                let command = self.machine.toggle_mock(self.mock_interval);
                if self.machine.mock_active() {
                    self.ingress.record(RawKind::Status, "Mock data started");
                } else {
                    self.session.pause();
                    self.ingress.record(RawKind::Status, "Mock data stopped");
                }
                self.dispatch(command);
            }
            Message::StartSession => {
                log::info!("Starting new session");
                self.clear_readings();
                self.session.start();
            }
            Message::ResetSession => {
                log::info!("Session reset");
                self.clear_readings();
                self.session.reset();
            }
            Message::SendCommand(command) => {
                if let Err(e) = self.send_command(&command) {
                    log::warn!("{}", e);
                }
            }
            Message::UpdateProfile(profile) => {
                if let Err(e) = profile.validate() {
                    log::warn!("{}; heart-rate zones and calories disabled until the profile is fixed", e);
                }
                self.profile = profile;
            }
        }
    }

    /// Forget everything derived from the previous session's samples
    fn clear_readings(&mut self) {
        self.detector.reset();
        self.current = None;
        self.zone = None;
    }

    fn dispatch(&mut self, command: ConnectionCommand) {
        if let Err(e) = self.command_sender.send(command) {
            let error = ConnectionError::WorkerGone;
            log::error!("{}: {:?}", error, e.0);
            self.machine.on_transport_event(TransportEvent::Failed(error.to_string()));
        }
    }

    /// Send a command frame to the relay. Requires an open relay socket; the
    /// relay's device status does not matter.
    pub fn send_command(&mut self, command: &OutboundCommand) -> Result<(), ConnectionError> {
        if !self.machine.relay_active() {
            return Err(ConnectionError::NotConnected);
        }
        let frame = command.to_json();
        self.command_sender
            .send(ConnectionCommand::Send(frame.clone()))
            .map_err(|_| ConnectionError::WorkerGone)?;
        self.ingress.record(RawKind::Command, frame);
        Ok(())
    }

    fn handle_source_update(&mut self, update: SourceUpdate) {
        if !self.machine.is_current(update.generation) {
            log::debug!(
                "Dropping update from superseded source {} (current {})",
                update.generation,
                self.machine.generation()
            );
            return;
        }

        match update.update {
            SensorUpdate::Opened => {
                self.ingress.record(RawKind::Status, "WebSocket connected");
                self.machine.on_transport_event(TransportEvent::Opened);
            }
            SensorUpdate::Closed => {
                self.ingress.record(RawKind::Status, "WebSocket closed");
                self.machine.on_transport_event(TransportEvent::Closed);
                self.session.pause();
            }
            SensorUpdate::Failed(error) => {
                log::error!("Connection error: {}", error);
                self.ingress.record(RawKind::Error, error.to_string());
                self.machine.on_transport_event(TransportEvent::Failed(error.to_string()));
                self.session.pause();
            }
            SensorUpdate::Frame(text) => match self.ingress.accept_frame(&text) {
                Ok(Inbound::Data(sample)) => self.process_sample(sample),
                Ok(Inbound::Status { connected, message }) => {
                    log::info!("Relay status: {} ({})", message, if connected { "device connected" } else { "no device" });
                    self.machine.on_relay_status(connected);
                }
                Err(e) => log::warn!("{}", e),
            },
            SensorUpdate::Sample(sample) => {
                let sample = self.ingress.accept_sample(sample);
                self.process_sample(sample);
            }
        }
    }

    fn process_sample(&mut self, sample: Sample) {
        let outcome = self.detector.process(&sample);
        let calories = calories_for_profile(sample.heart_rate, &self.profile);
        if sample.heart_rate.is_finite() {
            self.zone = self
                .profile
                .max_heart_rate()
                .map(|max_hr| heart_rate_zone(sample.heart_rate, max_hr));
        }

        if let Some(punch) = outcome.punch {
            log::debug!("Punch: {} force={:.0} speed={:.2}", punch.kind.as_str(), punch.force, punch.speed);
        }
        if outcome.block_detected {
            log::debug!("Block");
        }

        self.session.record(&sample, &outcome, calories);
        self.current = Some(sample);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.machine.status()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.machine.last_error()
    }

    pub fn mock_active(&self) -> bool {
        self.machine.mock_active()
    }

    pub fn current_sample(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    pub fn motion_state(&self) -> MotionState {
        self.detector.motion_state()
    }

    pub fn zone(&self) -> Option<HeartRateZone> {
        self.zone
    }

    pub fn aggregate(&self) -> &SessionAggregate {
        self.session.aggregate()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn raw_messages(&self) -> &RawMessageLog {
        self.ingress.log()
    }

    /// One-line summary for the console
    pub fn summary(&self) -> String {
        let totals = self.aggregate();
        let heart_rate = self
            .current
            .as_ref()
            .map(|s| s.heart_rate)
            .filter(|hr| hr.is_finite())
            .map(|hr| format!("{:.0} bpm", hr))
            .unwrap_or_else(|| "-- bpm".to_string());
        let zone = self.zone.map(|z| z.label()).unwrap_or("--");

        format!(
            "[{}{}] {} | HR {} ({}) peak {:.0} | punches {} blocks {} | {} | {:.1} kcal",
            self.status(),
            if self.mock_active() { ", mock" } else { "" },
            totals.elapsed_display(),
            heart_rate,
            zone,
            totals.peak_heart_rate,
            totals.punch_count,
            totals.block_count,
            self.motion_state(),
            totals.calories_burned,
        )
    }

    /// Multi-line session report: punch breakdown, time in zone, last error
    pub fn report(&self) -> String {
        let totals = self.aggregate();
        let stats = &totals.punch_stats;
        let mut lines = vec![format!(
            "Session {} ({:?}): {} punches, {} blocks, peak {:.0} bpm, {:.1} kcal",
            totals.elapsed_display(),
            self.session_state(),
            totals.punch_count,
            totals.block_count,
            totals.peak_heart_rate,
            totals.calories_burned,
        )];

        let by_kind = PunchKind::all()
            .iter()
            .map(|kind| format!("{} {}", kind.as_str(), stats.by_kind.get(kind).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!(
            "Force: last {:.0}, max {:.0}, avg {:.0} | {}",
            stats.last_force, stats.max_force, stats.average_force, by_kind
        ));

        match self.profile.max_heart_rate() {
            Some(max_hr) => {
                let bounds = zone_thresholds(max_hr);
                let zones = HeartRateZone::all()
                    .iter()
                    .map(|zone| {
                        let from = match zone.index() {
                            0 => 0.0,
                            i => bounds[i - 1],
                        };
                        format!("{} >={:.0}: {}s", zone.label(), from, totals.seconds_in(*zone))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("Zones (max {:.0} bpm): {}", max_hr, zones));
            }
            None => lines.push("Zones: profile invalid".to_string()),
        }

        if let Some(sample) = &self.current {
            lines.push(format!(
                "Last sample {}: FSR {:.0}/{:.0}/{:.0}, accel |{:.2}|",
                sample.timestamp.format("%H:%M:%S"),
                sample.fsr_index,
                sample.fsr_middle,
                sample.fsr_impact,
                sample.accelerometer.magnitude(),
            ));
        }
        if let Some(error) = self.last_error() {
            lines.push(format!("Last error: {}", error));
        }
        lines.join("\n")
    }
}
