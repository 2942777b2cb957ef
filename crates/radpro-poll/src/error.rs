//! Error types for the polling stack

use std::io;

use radpro_detect::DetectError;
use radpro_protocol::{CodecError, Field};
use thiserror::Error;

/// Errors raised by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port could not be opened or the link could not be established
    #[error("cannot connect to {port}: {reason}")]
    Connection { port: String, reason: String },

    /// No complete response line arrived in time
    #[error("no response from {port} within {timeout_ms}ms")]
    Timeout { port: String, timeout_ms: u64 },

    /// Read or write failure on an open link, including disconnects
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },

    /// The transport was already closed
    #[error("{port} is closed")]
    Closed { port: String },
}

impl TransportError {
    /// Whether the link has to be re-established before the next exchange
    pub fn is_connection_level(&self) -> bool {
        !matches!(self, Self::Timeout { .. })
    }
}

/// What went wrong during a single exchange
#[derive(Debug, Error)]
pub enum ExchangeFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A failed exchange, tagged with the field that was requested
#[derive(Debug, Error)]
#[error("reading {field} failed: {source}")]
pub struct ExchangeError {
    pub field: Field,
    #[source]
    pub source: ExchangeFailure,
}

impl ExchangeError {
    pub fn new(field: Field, source: impl Into<ExchangeFailure>) -> Self {
        Self {
            field,
            source: source.into(),
        }
    }

    /// Whether the link has to be re-established before the next exchange
    pub fn is_connection_level(&self) -> bool {
        match &self.source {
            ExchangeFailure::Transport(e) => e.is_connection_level(),
            ExchangeFailure::Codec(_) => false,
        }
    }
}

/// Errors surfaced by the polling coordinator
#[derive(Debug, Error)]
pub enum PollError {
    /// An exchange with the device failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Opening the link failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Auto-detection found no device
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// No link is open and none could be established this cycle
    #[error("not connected")]
    NotConnected,

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PollError {
    /// Whether the coordinator should reconnect before the next exchange
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::Exchange(e) => e.is_connection_level(),
            Self::Transport(e) => e.is_connection_level(),
            Self::Detect(_) | Self::NotConnected => true,
            Self::InvalidConfig(_) => false,
        }
    }
}
