//! # Connection Management Module
//!
//! Handles the relay connection lifecycle and the mock generator that can
//! stand in for it.
//!
//! ## Key Components
//! - `ConnectionMachine`: Status state machine owned by the dashboard thread
//! - `ConnectionCommand`: Commands sent from the dashboard to the worker
//! - `ConnectionManager`: Worker thread that runs the active source on a Tokio runtime
//!
//! ## Sources and Generations
//! Exactly one source (relay transport or mock generator) runs at a time.
//! Every connect, disconnect and mock toggle starts a new generation; each
//! source stamps its updates with the generation it was started under. The
//! machine accepts only the current generation, so anything still queued
//! from a torn-down source is discarded before it can touch session state.
//!
//! ## States
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//!       ^                        |                   |
//!       +--------close-----------+-------close-------+
//! any --transport error--> Error   (kept on the following close)
//! any --disconnect--> Disconnected
//! toggle_mock: off -> Connected (mock), on -> Disconnected
//! ```

use crate::error::ConnectionError;
use crate::mock::run_mock_source;
use crate::sensor::{SourceLink, SourceUpdate};
use crate::transport::run_relay_source;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Commands sent from the dashboard thread to the connection worker
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionCommand {
    /// Stop whatever runs and connect to the relay
    Connect { generation: u64, url: String },
    /// Stop whatever runs and start the mock generator
    StartMock { generation: u64, interval: Duration },
    /// Stop whatever runs
    Stop,
    /// Send a serialized command frame over the open relay connection
    Send(String),
}

/// Relay lifecycle events the machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Failed(String),
}

/// Connection status state machine.
///
/// Pure state: it decides what the worker should do and returns the command,
/// the caller delivers it.
#[derive(Debug)]
pub struct ConnectionMachine {
    status: ConnectionStatus,
    mock_active: bool,
    /// Relay socket is open, whatever the relay says about the device
    transport_open: bool,
    generation: u64,
    last_error: Option<String>,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            mock_active: false,
            transport_open: false,
            generation: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn mock_active(&self) -> bool {
        self.mock_active
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// True while the relay socket (not the mock) is open. Independent of
    /// the relay's device status, so commands still go out while the relay
    /// reports no glove attached.
    pub fn relay_active(&self) -> bool {
        !self.mock_active && self.transport_open
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Tear down any running source and connect to `url`
    pub fn connect(&mut self, url: &str) -> ConnectionCommand {
        let generation = self.next_generation();
        if self.mock_active {
            log::info!("Stopping mock data before connecting");
        }
        self.mock_active = false;
        self.transport_open = false;
        self.last_error = None;
        self.status = ConnectionStatus::Connecting;
        ConnectionCommand::Connect {
            generation,
            url: url.to_string(),
        }
    }

    /// Tear down any running source
    pub fn disconnect(&mut self) -> ConnectionCommand {
        self.next_generation();
        self.mock_active = false;
        self.transport_open = false;
        self.last_error = None;
        self.status = ConnectionStatus::Disconnected;
        ConnectionCommand::Stop
    }

    /// Start the mock generator if it is off, stop it if it is on
    pub fn toggle_mock(&mut self, interval: Duration) -> ConnectionCommand {
        let generation = self.next_generation();
        self.transport_open = false;
        if self.mock_active {
            self.mock_active = false;
            self.status = ConnectionStatus::Disconnected;
            ConnectionCommand::Stop
        } else {
            self.mock_active = true;
            self.last_error = None;
            self.status = ConnectionStatus::Connected;
            ConnectionCommand::StartMock { generation, interval }
        }
    }

    /// Apply a transport lifecycle event from the current source
    pub fn on_transport_event(&mut self, event: TransportEvent) {
        if self.mock_active {
            return;
        }
        match event {
            TransportEvent::Opened => {
                self.transport_open = true;
                if self.status == ConnectionStatus::Connecting {
                    self.status = ConnectionStatus::Connected;
                }
            }
            TransportEvent::Failed(reason) => {
                self.transport_open = false;
                self.status = ConnectionStatus::Error;
                self.last_error = Some(reason);
            }
            TransportEvent::Closed => {
                self.transport_open = false;
                if self.status != ConnectionStatus::Error {
                    self.status = ConnectionStatus::Disconnected;
                }
            }
        }
    }

    /// Apply a status message sent by the relay over an open connection
    pub fn on_relay_status(&mut self, connected: bool) {
        if self.mock_active || self.status == ConnectionStatus::Error {
            return;
        }
        self.status = if connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
    }
}

/// A running source and the means to stop it
struct ActiveSource {
    generation: u64,
    should_stop: Arc<AtomicBool>,
    outbound: Option<UnboundedSender<String>>,
}

impl ActiveSource {
    /// Hand a command frame to the relay task. Mock sources have no socket.
    fn forward(&self, frame: String) -> Result<(), ConnectionError> {
        let outbound = self.outbound.as_ref().ok_or(ConnectionError::NotConnected)?;
        outbound
            .send(frame)
            .map_err(|_| ConnectionError::Transport("relay connection already closed".to_string()))
    }

    fn stop(self) {
        log::debug!("Connection manager: stopping source {}", self.generation);
        self.should_stop.store(true, Ordering::Relaxed);
    }
}

/// Decrements the live source count when a source task ends
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs the relay transport or mock generator for the dashboard.
///
/// Lives on a dedicated thread with its own Tokio runtime so the dashboard
/// thread never blocks on network I/O.
pub struct ConnectionManager {
    command_receiver: Receiver<ConnectionCommand>,
    update_sender: Sender<SourceUpdate>,
    live_sources: Arc<AtomicUsize>,
}

impl ConnectionManager {
    /// Creates a new ConnectionManager.
    ///
    /// Returns the manager and a sender for issuing commands from the dashboard thread.
    pub fn new(update_sender: Sender<SourceUpdate>) -> (Self, Sender<ConnectionCommand>) {
        let (command_sender, command_receiver) = crossbeam_channel::unbounded();

        let manager = ConnectionManager {
            command_receiver,
            update_sender,
            live_sources: Arc::new(AtomicUsize::new(0)),
        };

        (manager, command_sender)
    }

    /// Number of source tasks still running
    pub fn live_sources(&self) -> Arc<AtomicUsize> {
        self.live_sources.clone()
    }

    /// Runs the connection management loop.
    ///
    /// Call from a spawned thread. Blocks until the command channel is closed.
    pub fn run(self) {
        let rt = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                let error = ConnectionError::RuntimeCreation(e.to_string());
                log::error!("{}", error);
                return;
            }
        };

        let mut active: Option<ActiveSource> = None;

        while let Ok(command) = self.command_receiver.recv() {
            match command {
                ConnectionCommand::Connect { generation, url } => {
                    if let Some(source) = active.take() {
                        source.stop();
                    }
                    log::info!("Connection manager: connecting to {} (source {})", url, generation);

                    let should_stop = Arc::new(AtomicBool::new(false));
                    let (outbound_tx, outbound_rx) = unbounded_channel();
                    let link = SourceLink::new(generation, self.update_sender.clone());
                    let guard = LiveGuard::new(&self.live_sources);
                    let stop = should_stop.clone();

                    rt.spawn(async move {
                        let _guard = guard;
                        run_relay_source(url, link, outbound_rx, stop).await;
                    });

                    active = Some(ActiveSource {
                        generation,
                        should_stop,
                        outbound: Some(outbound_tx),
                    });
                }
                ConnectionCommand::StartMock { generation, interval } => {
                    if let Some(source) = active.take() {
                        source.stop();
                    }
                    log::info!("Connection manager: starting mock data (source {})", generation);

                    let should_stop = Arc::new(AtomicBool::new(false));
                    let link = SourceLink::new(generation, self.update_sender.clone());
                    let guard = LiveGuard::new(&self.live_sources);
                    let stop = should_stop.clone();

                    rt.spawn(async move {
                        let _guard = guard;
                        run_mock_source(link, interval, stop).await;
                    });

                    active = Some(ActiveSource {
                        generation,
                        should_stop,
                        outbound: None,
                    });
                }
                ConnectionCommand::Stop => {
                    log::info!("Connection manager: stop requested");
                    if let Some(source) = active.take() {
                        source.stop();
                    }
                }
                ConnectionCommand::Send(frame) => {
                    let result = match active.as_ref() {
                        Some(source) => source.forward(frame),
                        None => Err(ConnectionError::NotConnected),
                    };
                    if let Err(e) = result {
                        log::warn!("Connection manager: command dropped: {}", e);
                    }
                }
            }
        }

        if let Some(source) = active.take() {
            source.stop();
        }
        // Give sources a moment to see their stop flag before the runtime is dropped
        rt.shutdown_timeout(Duration::from_millis(500));
        log::info!("Connection manager: command channel closed, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorUpdate;
    use std::thread;
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    #[test]
    fn test_connect_moves_to_connecting_then_connected() {
        let mut machine = ConnectionMachine::new();
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);

        let cmd = machine.connect("ws://localhost:3001");
        assert_eq!(
            cmd,
            ConnectionCommand::Connect {
                generation: 1,
                url: "ws://localhost:3001".to_string()
            }
        );
        assert_eq!(machine.status(), ConnectionStatus::Connecting);

        machine.on_transport_event(TransportEvent::Opened);
        assert_eq!(machine.status(), ConnectionStatus::Connected);

        machine.on_transport_event(TransportEvent::Closed);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_error_is_kept_through_close() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://localhost:3001");
        machine.on_transport_event(TransportEvent::Failed("refused".to_string()));
        machine.on_transport_event(TransportEvent::Closed);

        assert_eq!(machine.status(), ConnectionStatus::Error);
        assert_eq!(machine.last_error(), Some("refused"));

        // Relay status cannot paper over a transport error
        machine.on_relay_status(true);
        assert_eq!(machine.status(), ConnectionStatus::Error);

        machine.connect("ws://localhost:3001");
        assert_eq!(machine.status(), ConnectionStatus::Connecting);
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn test_reconnect_supersedes_previous_generation() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://a");
        let first = machine.generation();
        machine.connect("ws://b");
        assert!(!machine.is_current(first));
        assert!(machine.is_current(machine.generation()));
    }

    #[test]
    fn test_toggle_mock_twice_restores_status() {
        let mut machine = ConnectionMachine::new();
        let interval = Duration::from_millis(1000);

        let cmd = machine.toggle_mock(interval);
        assert!(matches!(cmd, ConnectionCommand::StartMock { .. }));
        assert!(machine.mock_active());
        assert_eq!(machine.status(), ConnectionStatus::Connected);

        let cmd = machine.toggle_mock(interval);
        assert_eq!(cmd, ConnectionCommand::Stop);
        assert!(!machine.mock_active());
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_mock_ignores_relay_events() {
        let mut machine = ConnectionMachine::new();
        machine.toggle_mock(Duration::from_millis(1000));
        machine.on_relay_status(false);
        machine.on_transport_event(TransportEvent::Closed);
        assert_eq!(machine.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_connect_turns_mock_off() {
        let mut machine = ConnectionMachine::new();
        machine.toggle_mock(Duration::from_millis(1000));
        machine.connect("ws://localhost:3001");
        assert!(!machine.mock_active());
        assert!(!machine.relay_active());
        machine.on_transport_event(TransportEvent::Opened);
        assert!(machine.relay_active());
    }

    #[test]
    fn test_relay_stays_usable_without_device() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://localhost:3001");
        machine.on_transport_event(TransportEvent::Opened);
        machine.on_relay_status(false);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert!(machine.relay_active());

        machine.on_transport_event(TransportEvent::Closed);
        assert!(!machine.relay_active());
    }

    #[test]
    fn test_transport_failure_closes_relay() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://localhost:3001");
        machine.on_transport_event(TransportEvent::Opened);
        machine.on_transport_event(TransportEvent::Failed("reset by peer".to_string()));
        assert!(!machine.relay_active());
    }

    #[test]
    fn test_disconnect_clears_last_error() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://localhost:3001");
        machine.on_transport_event(TransportEvent::Failed("refused".to_string()));
        assert_eq!(machine.last_error(), Some("refused"));

        machine.disconnect();
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn test_relay_status_maps_to_connection_status() {
        let mut machine = ConnectionMachine::new();
        machine.connect("ws://localhost:3001");
        machine.on_transport_event(TransportEvent::Opened);
        machine.on_relay_status(false);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        machine.on_relay_status(true);
        assert_eq!(machine.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let mut machine = ConnectionMachine::new();
        machine.toggle_mock(Duration::from_millis(1000));
        assert_eq!(machine.disconnect(), ConnectionCommand::Stop);
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
        assert!(!machine.mock_active());
    }

    #[test]
    fn test_manager_runs_one_mock_at_a_time() {
        let (update_tx, update_rx) = crossbeam_channel::unbounded();
        let (manager, commands) = ConnectionManager::new(update_tx);
        let live = manager.live_sources();
        let worker = thread::spawn(move || manager.run());

        let interval = Duration::from_millis(10);
        commands.send(ConnectionCommand::StartMock { generation: 1, interval }).unwrap();
        commands.send(ConnectionCommand::StartMock { generation: 2, interval }).unwrap();

        // Generation 1 is stopped; eventually only generation 2 produces samples
        assert!(wait_until(Duration::from_secs(2), || live.load(Ordering::SeqCst) == 1));
        while update_rx.try_recv().is_ok() {}
        let update = update_rx.recv_timeout(Duration::from_secs(2)).expect("mock sample");
        assert_eq!(update.generation, 2);
        assert!(matches!(update.update, SensorUpdate::Sample(_)));

        commands.send(ConnectionCommand::Stop).unwrap();
        assert!(wait_until(Duration::from_secs(2), || live.load(Ordering::SeqCst) == 0));

        drop(commands);
        worker.join().unwrap();
    }

    #[test]
    fn test_mock_source_refuses_commands() {
        let source = ActiveSource {
            generation: 1,
            should_stop: Arc::new(AtomicBool::new(false)),
            outbound: None,
        };
        assert!(matches!(
            source.forward("{}".to_string()),
            Err(ConnectionError::NotConnected)
        ));
    }

    #[test]
    fn test_relay_source_forwards_commands() {
        let (outbound_tx, mut outbound_rx) = unbounded_channel();
        let source = ActiveSource {
            generation: 2,
            should_stop: Arc::new(AtomicBool::new(false)),
            outbound: Some(outbound_tx),
        };
        let frame = r#"{"type":"command","command":"reconnect"}"#.to_string();
        source.forward(frame.clone()).unwrap();
        assert_eq!(outbound_rx.try_recv().unwrap(), frame);

        // Relay task gone
        drop(outbound_rx);
        assert!(matches!(
            source.forward(frame),
            Err(ConnectionError::Transport(_))
        ));
    }
}
