//! # Error Types Module
//!
//! Centralized error handling for the glove dashboard.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `ConnectionError`: WebSocket transport and runtime failures
//! - `MalformedSampleError`: A relay frame that could not be turned into a sample
//! - `InvalidProfileError`: User profile values outside their allowed range
//! - `ConfigError`: Configuration file I/O and parsing errors
//!
//! ## Propagation
//! Transport errors end the current connection and surface as
//! `ConnectionStatus::Error`. Sample and profile errors are always absorbed
//! where they happen: logged, recorded, and skipped.

use std::fmt;

/// Errors that can occur during connection management
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Failed to create Tokio runtime
    RuntimeCreation(String),
    /// WebSocket handshake with the relay failed
    Handshake { url: String, reason: String },
    /// An open transport failed
    Transport(String),
    /// Command requires an open relay connection
    NotConnected,
    /// The connection worker thread has shut down
    WorkerGone,
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::RuntimeCreation(msg) => {
                write!(f, "Failed to create async runtime: {}", msg)
            }
            ConnectionError::Handshake { url, reason } => {
                write!(f, "Failed to connect to relay at {}: {}", url, reason)
            }
            ConnectionError::Transport(msg) => {
                write!(f, "Relay connection error: {}", msg)
            }
            ConnectionError::NotConnected => {
                write!(f, "Not connected to the relay. Connect before sending commands.")
            }
            ConnectionError::WorkerGone => {
                write!(f, "Connection worker is no longer running")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// A relay frame that could not be parsed into a sample or status message
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedSampleError {
    /// The frame exactly as received
    pub raw: String,
    pub reason: String,
}

impl MalformedSampleError {
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedSampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed sample ({}): {}", self.reason, self.raw)
    }
}

impl std::error::Error for MalformedSampleError {}

/// A user profile field outside its allowed range
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidProfileError {
    pub field: &'static str,
    pub value: f64,
    pub allowed: (f64, f64),
}

impl fmt::Display for InvalidProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid profile {}: {} (allowed {}-{})",
            self.field, self.value, self.allowed.0, self.allowed.1
        )
    }
}

impl std::error::Error for InvalidProfileError {}

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
        }
    }
}
