mod config;
mod connection;
mod dashboard;
mod detector;
mod error;
mod ingress;
mod mock;
mod physiology;
mod sensor;
mod session;
mod transport;

use config::Config;
use connection::ConnectionManager;
use crossbeam_channel::{select, Receiver};
use dashboard::{Dashboard, Message};
use ingress::{CommandName, OutboundCommand};
use physiology::{Gender, UserProfile};
use sensor::SourceUpdate;
use std::io::BufRead;
use std::time::Duration;

const HELP: &str = "commands: connect | disconnect | mock | start | reset | \
send <toggleMock|reconnect|arduino TEXT> | profile <age> <weight_kg> <male|female> [max_hr] | stats | log | quit";

enum Input {
    Message(Message),
    Report,
    RawLog,
    Quit,
}

/// Parse one console line into a dashboard action
fn parse_input(line: &str, current: &UserProfile) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let message = match verb {
        "connect" => Message::Connect,
        "disconnect" => Message::Disconnect,
        "mock" => Message::ToggleMockData,
        "start" => Message::StartSession,
        "reset" => Message::ResetSession,
        "quit" | "exit" => return Ok(Some(Input::Quit)),
        "stats" => return Ok(Some(Input::Report)),
        "log" => return Ok(Some(Input::RawLog)),
        "send" => {
            let command = match words.next() {
                Some("toggleMock") => OutboundCommand::new(CommandName::ToggleMock),
                Some("reconnect") => OutboundCommand::new(CommandName::Reconnect),
                Some("arduino") => {
                    let text = words.collect::<Vec<_>>().join(" ");
                    if text.is_empty() {
                        return Err("send arduino needs some text".to_string());
                    }
                    OutboundCommand::send_to_arduino(text)
                }
                other => return Err(format!("unknown relay command {:?}", other.unwrap_or(""))),
            };
            Message::SendCommand(command)
        }
        "profile" => {
            let fields: Vec<&str> = words.collect();
            if fields.len() < 3 {
                return Err("profile needs <age> <weight_kg> <male|female> [max_hr]".to_string());
            }
            let age = fields[0].parse::<u32>().map_err(|e| format!("age: {}", e))?;
            let weight_kg = fields[1].parse::<f64>().map_err(|e| format!("weight: {}", e))?;
            let gender = match fields[2] {
                "male" => Gender::Male,
                "female" => Gender::Female,
                other => return Err(format!("gender must be male or female, got {:?}", other)),
            };
            let max_heart_rate = match fields.get(3) {
                Some(raw) => Some(raw.parse::<u32>().map_err(|e| format!("max_hr: {}", e))?),
                None => None,
            };
            let profile = UserProfile {
                age,
                weight_kg,
                gender,
                max_heart_rate,
            };
            if profile == *current {
                return Ok(None);
            }
            Message::UpdateProfile(profile)
        }
        "help" => {
            println!("{}", HELP);
            return Ok(None);
        }
        other => return Err(format!("unknown command {:?}; try help", other)),
    };

    Ok(Some(Input::Message(message)))
}

/// Forward stdin lines to the main loop
fn spawn_console() -> Receiver<String> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Console input closed: {}", e);
                    break;
                }
            }
        }
    });
    receiver
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::load().unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        Config::default()
    });

    // Channel for source updates from the connection worker to the dashboard
    let (sender, receiver) = crossbeam_channel::unbounded::<SourceUpdate>();

    let (manager, command_sender) = ConnectionManager::new(sender);

    // Spawn a thread to run the active source
    let worker = std::thread::spawn(move || {
        manager.run();
    });

    let mut dashboard = Dashboard::new(&config, receiver, command_sender);
    if config.start_with_mock {
        dashboard.update(Message::ToggleMockData);
    } else if config.auto_connect {
        dashboard.update(Message::Connect);
    }

    log::info!("Glove signal ready; relay {}", config.relay_url);
    println!("{}", HELP);

    let drain = crossbeam_channel::tick(Duration::from_millis(16));
    let clock = crossbeam_channel::tick(Duration::from_secs(1));
    let mut console = spawn_console();

    loop {
        let input = console.clone();
        select! {
            recv(drain) -> _ => dashboard.update(Message::Tick),
            recv(clock) -> _ => {
                dashboard.update(Message::ClockTick);
                log::info!("{}", dashboard.summary());
            }
            recv(input) -> line => {
                let Ok(line) = line else {
                    log::info!("Console closed; running until interrupted");
                    console = crossbeam_channel::never();
                    continue;
                };
                match parse_input(&line, &config.profile) {
                    Ok(Some(Input::Quit)) => break,
                    Ok(Some(Input::Report)) => println!("{}", dashboard.report()),
                    Ok(Some(Input::RawLog)) => {
                        for entry in dashboard.raw_messages().entries() {
                            println!("{} {:?} {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.kind, entry.content);
                        }
                    }
                    Ok(Some(Input::Message(message))) => {
                        if let Message::UpdateProfile(profile) = &message {
                            config.profile = profile.clone();
                            if let Err(e) = config.save() {
                                log::warn!("{}", e);
                            }
                        }
                        dashboard.update(message);
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("{}", e),
                }
            }
        }
    }

    dashboard.update(Message::Disconnect);
    // Dropping the dashboard closes the command channel and ends the worker
    drop(dashboard);
    if worker.join().is_err() {
        log::error!("Connection worker panicked");
    }
}
