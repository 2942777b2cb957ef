//! Line-oriented serial transport
//!
//! A [`Transport`] owns one open link to a device and moves whole lines over
//! it. It is generic over the I/O type so that tests can run against an
//! in-memory `DuplexStream` instead of a real serial port.

use std::io;
use std::time::Duration;

use radpro_protocol::{LineCodec, ProtocolCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace};

use crate::error::TransportError;

/// Everything needed to open a link; immutable for the life of a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub path: String,
    pub baud_rate: u32,
    /// Maximum wait for a response line
    pub timeout: Duration,
}

impl ConnectionDescriptor {
    pub fn new(path: impl Into<String>, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout,
        }
    }
}

/// An open line-oriented link to a device
pub struct Transport<S> {
    descriptor: ConnectionDescriptor,
    io: Option<S>,
    codec: LineCodec,
    buffer: Vec<u8>,
}

impl Transport<SerialStream> {
    /// Open the serial port described by `descriptor`
    pub fn open(descriptor: ConnectionDescriptor) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(&descriptor.path, descriptor.baud_rate)
            .timeout(descriptor.timeout)
            .open_native_async()
            .map_err(|e| TransportError::Connection {
                port: descriptor.path.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Opened {} at {} baud",
            descriptor.path, descriptor.baud_rate
        );
        Ok(Self::from_stream(descriptor, stream))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open stream
    pub fn from_stream(descriptor: ConnectionDescriptor, io: S) -> Self {
        Self {
            descriptor,
            io: Some(io),
            codec: LineCodec::new(),
            buffer: vec![0u8; 256],
        }
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    pub fn is_open(&self) -> bool {
        self.io.is_some()
    }

    /// Write `text` followed by the line terminator
    ///
    /// Input that arrived since the last exchange (a late reply to a timed
    /// out request) is discarded first so it cannot be taken as the answer to
    /// this request.
    pub async fn send_line(&mut self, text: &str) -> Result<(), TransportError> {
        self.discard_stale_input().await?;

        let port = &self.descriptor.path;
        let io = self.io.as_mut().ok_or_else(|| TransportError::Closed {
            port: port.clone(),
        })?;

        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');

        let result = match io.write_all(&data).await {
            Ok(()) => io.flush().await,
            Err(e) => Err(e),
        };

        if let Err(source) = result {
            self.io = None;
            return Err(TransportError::Io {
                port: port.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Read one line, waiting at most the descriptor's timeout
    pub async fn receive_line(&mut self) -> Result<String, TransportError> {
        let deadline = Instant::now() + self.descriptor.timeout;

        loop {
            if let Some(line) = self.codec.next_frame() {
                return Ok(line);
            }

            let port = &self.descriptor.path;
            let io = self.io.as_mut().ok_or_else(|| TransportError::Closed {
                port: port.clone(),
            })?;

            match timeout_at(deadline, io.read(&mut self.buffer)).await {
                Ok(Ok(0)) => {
                    self.io = None;
                    return Err(TransportError::Io {
                        port: port.clone(),
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "device disconnected"),
                    });
                }
                Ok(Ok(n)) => self.codec.push_bytes(&self.buffer[..n]),
                Ok(Err(e))
                    if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
                {
                    trace!("Transient read error on {}: {}", port, e);
                }
                Ok(Err(source)) => {
                    self.io = None;
                    return Err(TransportError::Io {
                        port: port.clone(),
                        source,
                    });
                }
                Err(_) => {
                    self.codec.clear();
                    return Err(TransportError::Timeout {
                        port: port.clone(),
                        timeout_ms: self.descriptor.timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Release the underlying stream; calling it again is a no-op
    pub async fn close(&mut self) {
        self.codec.clear();
        if let Some(mut io) = self.io.take() {
            let _ = io.shutdown().await;
            info!("Closed {}", self.descriptor.path);
        }
    }

    /// Drop buffered and immediately readable input
    async fn discard_stale_input(&mut self) -> Result<(), TransportError> {
        if self.codec.pending() > 0 {
            debug!(
                "Discarding {} stale bytes on {}",
                self.codec.pending(),
                self.descriptor.path
            );
            self.codec.clear();
        }

        let Some(io) = self.io.as_mut() else {
            return Ok(());
        };

        loop {
            match timeout(Duration::ZERO, io.read(&mut self.buffer)).await {
                Ok(Ok(0)) => {
                    self.io = None;
                    return Err(TransportError::Io {
                        port: self.descriptor.path.clone(),
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "device disconnected"),
                    });
                }
                Ok(Ok(n)) => debug!("Discarding {} stale bytes on {}", n, self.descriptor.path),
                // Nothing pending (or a transient error the next read will surface)
                Ok(Err(_)) | Err(_) => return Ok(()),
            }
        }
    }
}
