//! # Relay Transport Module
//!
//! WebSocket client for the serial relay. Forwards every text frame to the
//! dashboard untouched (parsing is the ingress's job) and writes outbound
//! command frames.
//!
//! ## Lifecycle Updates
//! `Opened` after the handshake, `Frame` per message, then exactly one of
//! `Closed` or `Failed` when the connection ends. A stop request ends the
//! loop with `Closed`.

use crate::error::ConnectionError;
use crate::sensor::{SensorUpdate, SourceLink};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message;

/// Resolve once `should_stop` is set
async fn wait_for_stop(should_stop: &Arc<AtomicBool>) {
    loop {
        if should_stop.load(Ordering::Relaxed) {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
}

/// Connect to `url` and pump frames until the connection ends or a stop is
/// requested. `outbound` carries serialized command frames to send.
pub async fn run_relay_source(
    url: String,
    link: SourceLink,
    mut outbound: UnboundedReceiver<String>,
    should_stop: Arc<AtomicBool>,
) {
    log::info!("Relay source {}: connecting to {}", link.generation(), url);

    let stream = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let error = ConnectionError::Handshake { url: url.clone(), reason: e.to_string() };
                log::error!("{}", error);
                link.send(SensorUpdate::Failed(error));
                return;
            }
        },
        _ = wait_for_stop(&should_stop) => {
            log::info!("Relay source {}: stopped while connecting", link.generation());
            link.send(SensorUpdate::Closed);
            return;
        }
    };

    log::info!("Relay source {}: connected", link.generation());
    link.send(SensorUpdate::Opened);

    let (mut write, mut read) = stream.split();
    let mut outbound_open = true;

    let ending = loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !link.send(SensorUpdate::Frame(text)) {
                        break SensorUpdate::Closed;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if !link.send(SensorUpdate::Frame(text)) {
                            break SensorUpdate::Closed;
                        }
                    }
                    Err(e) => log::warn!("Relay source {}: dropping non-UTF-8 frame: {}", link.generation(), e),
                },
                Some(Ok(Message::Close(frame))) => {
                    log::info!("Relay source {}: closed by relay: {:?}", link.generation(), frame);
                    break SensorUpdate::Closed;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let error = ConnectionError::Transport(e.to_string());
                    log::error!("Relay source {}: {}", link.generation(), error);
                    break SensorUpdate::Failed(error);
                }
                None => break SensorUpdate::Closed,
            },
            command = outbound.recv(), if outbound_open => {
                let Some(command) = command else {
                    outbound_open = false;
                    continue;
                };
                if let Err(e) = write.send(Message::Text(command)).await {
                    let error = ConnectionError::Transport(e.to_string());
                    log::error!("Relay source {}: send failed: {}", link.generation(), error);
                    break SensorUpdate::Failed(error);
                }
            },
            _ = wait_for_stop(&should_stop) => {
                log::info!("Relay source {}: disconnecting", link.generation());
                let _ = write.close().await;
                break SensorUpdate::Closed;
            }
        }
    };

    link.send(ending);
}
