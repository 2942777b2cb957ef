//! Request encoding and response decoding
//!
//! # Format
//! - Requests: `GET <field>` followed by `\n` (the terminator is added by the
//!   transport, not by [`encode_request`])
//! - Responses: `OK <payload>` on success, `ERROR <reason>` on failure
//! - Terminator: `\n` (0x0A), an optional preceding `\r` is ignored

use tracing::warn;

use crate::command::{Field, Value, ValueKind};
use crate::error::CodecError;
use crate::ProtocolCodec;

/// Maximum response line length (the longest real reply is the device id)
pub const MAX_LINE_LEN: usize = 256;

/// Line terminator appended by the transport
pub const TERMINATOR: u8 = b'\n';

/// Encode a read request for `field`, without the terminator
pub fn encode_request(field: Field) -> String {
    format!("GET {}", field.token())
}

/// Decode one response line as the reply to a request for `expected`
pub fn decode_response(line: &str, expected: Field) -> Result<Value, CodecError> {
    let trimmed = line.trim();
    let payload = match split_status(trimmed) {
        Status::Ok(payload) => payload,
        Status::Error => {
            return Err(CodecError::DeviceError {
                raw: line.to_string(),
            })
        }
        Status::Unknown => {
            return Err(CodecError::UnexpectedResponse {
                raw: line.to_string(),
            })
        }
    };

    if payload.is_empty() {
        return Err(CodecError::EmptyPayload {
            raw: line.to_string(),
        });
    }

    let invalid = || CodecError::InvalidPayload {
        field: expected,
        raw: line.to_string(),
    };

    match expected.kind() {
        ValueKind::Count => payload.parse::<u64>().map(Value::Count).map_err(|_| invalid()),
        ValueKind::Float => match payload.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Value::Float(v)),
            _ => Err(invalid()),
        },
        ValueKind::Text => Ok(Value::Text(payload.to_string())),
    }
}

enum Status<'a> {
    Ok(&'a str),
    Error,
    Unknown,
}

/// Classify a trimmed line by its status word
///
/// The status word must be followed by whitespace or end the line, so
/// `OKAY 5` or `ERRORS` are not accepted as `OK` / `ERROR`.
fn split_status(line: &str) -> Status<'_> {
    let (word, rest) = match line.find(char::is_whitespace) {
        Some(pos) => (&line[..pos], line[pos..].trim_start()),
        None => (line, ""),
    };

    match word {
        "OK" => Status::Ok(rest),
        "ERROR" => Status::Error,
        _ => Status::Unknown,
    }
}

/// Streaming newline-delimited line codec
///
/// Serial reads return arbitrary chunks; this buffers them and yields one
/// complete line at a time.
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Number of buffered bytes not yet part of a complete line
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec for LineCodec {
    type Frame = String;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Drop garbage that can never become a valid line
        if self.buffer.len() > MAX_LINE_LEN && !self.buffer.contains(&TERMINATOR) {
            warn!(
                "Discarding {} bytes without line terminator",
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    fn next_frame(&mut self) -> Option<String> {
        self.next_frame_with_bytes().map(|(line, _)| line)
    }

    fn next_frame_with_bytes(&mut self) -> Option<(String, Vec<u8>)> {
        let term_pos = self.buffer.iter().position(|&b| b == TERMINATOR)?;
        let raw: Vec<u8> = self.buffer.drain(..=term_pos).collect();

        let mut body = &raw[..raw.len() - 1];
        if body.last() == Some(&b'\r') {
            body = &body[..body.len() - 1];
        }

        Some((String::from_utf8_lossy(body).into_owned(), raw))
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ok_count_decodes_exactly(n: u64) {
            let line = format!("OK {}", n);
            prop_assert_eq!(decode_response(&line, Field::TubePulseCount), Ok(Value::Count(n)));
        }

        #[test]
        fn non_ok_lines_are_rejected(line in "[^O\\s][ -~]{0,40}") {
            prop_assert!(decode_response(&line, Field::TubePulseCount).is_err());
        }

        #[test]
        fn split_chunks_yield_same_line(n: u64, split in 0usize..24) {
            let wire = format!("OK {}\n", n).into_bytes();
            let split = split.min(wire.len());
            let mut codec = LineCodec::new();
            codec.push_bytes(&wire[..split]);
            codec.push_bytes(&wire[split..]);
            let line = codec.next_frame().unwrap();
            prop_assert_eq!(decode_response(&line, Field::TubePulseCount), Ok(Value::Count(n)));
        }
    }
}
