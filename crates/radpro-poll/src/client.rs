//! Typed request/response exchanges with one device

use std::time::Duration;

use radpro_protocol::{decode_response, encode_request, CodecError, DeviceIdentity, Field, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::ExchangeError;
use crate::transport::Transport;

/// One decoded reading and the moment its response arrived
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub field: Field,
    pub value: Value,
    pub timestamp: Instant,
}

/// Serialized access to a device over an open [`Transport`]
///
/// Each exchange holds the transport lock from request to response, so
/// concurrent callers can never interleave on the wire.
pub struct DeviceClient<S> {
    transport: Mutex<Transport<S>>,
    port: String,
    exchange_delay: Duration,
}

impl<S> DeviceClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(transport: Transport<S>, exchange_delay: Duration) -> Self {
        let port = transport.descriptor().path.clone();
        Self {
            transport: Mutex::new(transport),
            port,
            exchange_delay,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Request `field` and decode the response
    pub async fn read(&self, field: Field) -> Result<RawSample, ExchangeError> {
        let mut transport = self.transport.lock().await;

        let request = encode_request(field);
        debug!("TX {}: {}", self.port, request);
        transport
            .send_line(&request)
            .await
            .map_err(|e| ExchangeError::new(field, e))?;

        let line = transport
            .receive_line()
            .await
            .map_err(|e| ExchangeError::new(field, e))?;
        let timestamp = Instant::now();
        debug!("RX {}: {}", self.port, line);

        if !self.exchange_delay.is_zero() {
            sleep(self.exchange_delay).await;
        }

        let value = decode_response(&line, field).map_err(|e| ExchangeError::new(field, e))?;
        Ok(RawSample {
            field,
            value,
            timestamp,
        })
    }

    pub async fn read_device_id(&self) -> Result<DeviceIdentity, ExchangeError> {
        let sample = self.read(Field::DeviceId).await?;
        let raw = match sample.value {
            Value::Text(raw) => raw,
            other => return Err(mismatch(Field::DeviceId, &other)),
        };
        DeviceIdentity::parse(&raw).ok_or_else(|| {
            ExchangeError::new(Field::DeviceId, CodecError::EmptyPayload { raw })
        })
    }

    /// Read the cumulative pulse counter, keeping the arrival timestamp
    pub async fn read_pulse_count(&self) -> Result<RawSample, ExchangeError> {
        self.read(Field::TubePulseCount).await
    }

    /// Tube sensitivity in counts per minute per µSv/h
    pub async fn read_tube_sensitivity(&self) -> Result<f64, ExchangeError> {
        self.read_float(Field::TubeSensitivity).await
    }

    pub async fn read_battery_voltage(&self) -> Result<f64, ExchangeError> {
        self.read_float(Field::DeviceBatteryVoltage).await
    }

    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_open()
    }

    pub async fn close(&self) {
        self.transport.lock().await.close().await;
    }

    async fn read_float(&self, field: Field) -> Result<f64, ExchangeError> {
        let sample = self.read(field).await?;
        sample
            .value
            .as_float()
            .ok_or_else(|| mismatch(field, &sample.value))
    }
}

fn mismatch(field: Field, value: &Value) -> ExchangeError {
    ExchangeError::new(
        field,
        CodecError::InvalidPayload {
            field,
            raw: format!("{value:?}"),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExchangeFailure, TransportError};
    use crate::transport::ConnectionDescriptor;
    use radpro_sim::{spawn_virtual_device, VirtualDevice};

    fn client(link: tokio::io::DuplexStream) -> DeviceClient<tokio::io::DuplexStream> {
        let descriptor = ConnectionDescriptor::new("sim", 115_200, Duration::from_millis(500));
        DeviceClient::new(Transport::from_stream(descriptor, link), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_typed_reads() {
        let mut device = VirtualDevice::new();
        device.add_pulses(1005);
        let link = spawn_virtual_device(device);
        let client = client(link.stream);

        let identity = client.read_device_id().await.unwrap();
        assert!(!identity.device_id.is_empty());

        let sample = client.read_pulse_count().await.unwrap();
        assert_eq!(sample.field, Field::TubePulseCount);
        assert_eq!(sample.value, Value::Count(1005));

        assert!((client.read_tube_sensitivity().await.unwrap() - 153.8).abs() < 1e-9);
        assert!((client.read_battery_voltage().await.unwrap() - 1.32).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_device_error_is_codec_failure() {
        let link = spawn_virtual_device(VirtualDevice::new());
        link.commands
            .send(radpro_sim::DeviceCommand::SetFault {
                field: Field::DeviceBatteryVoltage,
                enabled: true,
            })
            .await
            .unwrap();
        let client = client(link.stream);

        let err = client.read_battery_voltage().await.unwrap_err();
        assert_eq!(err.field, Field::DeviceBatteryVoltage);
        assert!(matches!(
            err.source,
            ExchangeFailure::Codec(CodecError::DeviceError { .. })
        ));
        assert!(!err.is_connection_level());

        // The link stays usable
        assert!(client.read_pulse_count().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let link = spawn_virtual_device(VirtualDevice::new());
        link.commands
            .send(radpro_sim::DeviceCommand::SetMute(true))
            .await
            .unwrap();
        let client = client(link.stream);

        let err = client.read_pulse_count().await.unwrap_err();
        assert!(matches!(
            err.source,
            ExchangeFailure::Transport(TransportError::Timeout { .. })
        ));
    }
}
