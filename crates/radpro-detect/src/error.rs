//! Error types for Rad Pro detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    Enumeration(#[from] serialport::Error),

    /// Failed to open serial port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// No candidate answered the device-id probe
    #[error("no Rad Pro device found (tried {} port(s))", .tried.len())]
    DeviceNotFound { tried: Vec<String> },
}
