//! Error types for Rad Pro protocol parsing

use thiserror::Error;

use crate::command::Field;

/// Errors produced while decoding a response line
///
/// Every variant carries the raw line that was received so a failed exchange
/// can be diagnosed from the log alone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The device answered with `ERROR ...`
    #[error("device reported an error: {raw:?}")]
    DeviceError { raw: String },

    /// The line starts with neither `OK` nor `ERROR`
    #[error("unexpected response: {raw:?}")]
    UnexpectedResponse { raw: String },

    /// `OK` without a payload
    #[error("empty payload: {raw:?}")]
    EmptyPayload { raw: String },

    /// The payload could not be parsed as the field's value type
    #[error("invalid {field} payload: {raw:?}")]
    InvalidPayload { field: Field, raw: String },
}

impl CodecError {
    /// The raw line that triggered this error
    pub fn raw(&self) -> &str {
        match self {
            Self::DeviceError { raw }
            | Self::UnexpectedResponse { raw }
            | Self::EmptyPayload { raw }
            | Self::InvalidPayload { raw, .. } => raw,
        }
    }
}
