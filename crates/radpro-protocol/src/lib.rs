//! Rad Pro Protocol Library
//!
//! This crate provides request encoding and response parsing for the text
//! protocol spoken by Geiger counters running the Rad Pro firmware over a USB
//! serial link.
//!
//! # Architecture
//!
//! - [`Field`] names a readable device value and decides its payload type
//! - [`encode_request`] produces the `GET <field>` line
//! - [`LineCodec`] splits a byte stream into response lines
//! - [`decode_response`] turns an `OK <payload>` line into a typed [`Value`]
//!   or a [`CodecError`] naming the raw line
//!
//! The protocol is strictly half-duplex: one request, one response line.
//!
//! # Example
//!
//! ```rust
//! use radpro_protocol::{decode_response, encode_request, Field, LineCodec, ProtocolCodec, Value};
//!
//! assert_eq!(encode_request(Field::TubePulseCount), "GET tubePulseCount");
//!
//! let mut codec = LineCodec::new();
//! codec.push_bytes(b"OK 1005\n");
//!
//! let line = codec.next_frame().unwrap();
//! let value = decode_response(&line, Field::TubePulseCount).unwrap();
//! assert_eq!(value, Value::Count(1005));
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod identity;

pub use codec::{decode_response, encode_request, LineCodec, MAX_LINE_LEN, TERMINATOR};
pub use command::{Field, Value, ValueKind};
pub use error::CodecError;
pub use identity::DeviceIdentity;

/// Default serial baud rate of Rad Pro devices
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Trait for streaming codecs that frame incoming data
pub trait ProtocolCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete frame from the buffer
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// Try to extract the next complete frame along with its raw bytes
    ///
    /// Useful for traffic logging where the exact received bytes matter.
    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)>;

    /// Clear the internal buffer
    fn clear(&mut self);
}
