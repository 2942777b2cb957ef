//! Establishing the link to a device
//!
//! The coordinator never opens ports itself. It asks a [`Connector`] for a
//! fresh [`Transport`] whenever it has none, which is how reconnection after a
//! disconnect works.

use std::future::Future;

use radpro_detect::{DetectError, DetectedDevice};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialStream;
use tracing::{info, warn};

use crate::config::{PortSetting, SerialSettings};
use crate::error::{PollError, TransportError};
use crate::transport::{ConnectionDescriptor, Transport};

/// Source of open transports
pub trait Connector: Send {
    type Io: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open a new link to the device
    fn connect(&mut self) -> impl Future<Output = Result<Transport<Self::Io>, PollError>> + Send;
}

/// The port operations a [`SerialConnector`] builds on
pub trait PortAccess: Send {
    type Io: AsyncRead + AsyncWrite + Unpin + Send;

    /// Open the port named by `descriptor`
    fn open(&mut self, descriptor: ConnectionDescriptor) -> Result<Transport<Self::Io>, TransportError>;

    /// Find a device by probing candidate ports
    fn detect(&mut self, baud_rate: u32) -> impl Future<Output = Result<DetectedDevice, DetectError>> + Send;
}

/// Real serial ports and auto-detection
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortAccess for SystemPorts {
    type Io = SerialStream;

    fn open(&mut self, descriptor: ConnectionDescriptor) -> Result<Transport<SerialStream>, TransportError> {
        Transport::open(descriptor)
    }

    async fn detect(&mut self, baud_rate: u32) -> Result<DetectedDevice, DetectError> {
        radpro_detect::auto_detect(baud_rate).await
    }
}

/// Connects to a serial port, auto-detecting it when configured to
///
/// An explicit path is reopened as-is on every attempt. In auto mode the
/// last detected port is tried first and detection only runs again when it
/// can no longer be opened.
#[derive(Debug, Clone)]
pub struct SerialConnector<P = SystemPorts> {
    settings: SerialSettings,
    detected: Option<String>,
    ports: P,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self::with_ports(settings, SystemPorts)
    }
}

impl<P: PortAccess> SerialConnector<P> {
    pub fn with_ports(settings: SerialSettings, ports: P) -> Self {
        Self {
            settings,
            detected: None,
            ports,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Port found by the last successful auto-detection
    pub fn detected_port(&self) -> Option<&str> {
        self.detected.as_deref()
    }

    pub fn ports(&self) -> &P {
        &self.ports
    }

    fn descriptor(&self, path: &str) -> ConnectionDescriptor {
        ConnectionDescriptor::new(path, self.settings.baud_rate, self.settings.timeout)
    }

    async fn detect(&mut self) -> Result<Transport<P::Io>, PollError> {
        if let Some(path) = self.detected.take() {
            let descriptor = self.descriptor(&path);
            match self.ports.open(descriptor) {
                Ok(transport) => {
                    self.detected = Some(path);
                    return Ok(transport);
                }
                Err(e) => warn!("{}; re-running auto-detection", e),
            }
        }

        let found = self.ports.detect(self.settings.baud_rate).await?;
        info!(
            "Auto-detected {} on {}",
            found.identity.device_id, found.port
        );
        let descriptor = self.descriptor(&found.port);
        let transport = self.ports.open(descriptor)?;
        self.detected = Some(found.port);
        Ok(transport)
    }
}

impl<P: PortAccess> Connector for SerialConnector<P> {
    type Io = P::Io;

    async fn connect(&mut self) -> Result<Transport<P::Io>, PollError> {
        match &self.settings.port {
            PortSetting::Path(path) => {
                let descriptor = self.descriptor(path);
                Ok(self.ports.open(descriptor)?)
            }
            PortSetting::Auto => self.detect().await,
        }
    }
}
