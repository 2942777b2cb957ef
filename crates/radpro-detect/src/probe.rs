//! Device-id probing and auto-detection
//!
//! A port is a Rad Pro device if it answers `GET deviceId` with an `OK`
//! line carrying a non-empty identity. Probing never retries: the first
//! candidate that answers wins and later candidates are not opened.

use std::future::Future;
use std::time::Duration;

use radpro_protocol::{
    decode_response, encode_request, DeviceIdentity, Field, LineCodec, ProtocolCodec,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;
use crate::scanner::PortScanner;

/// Result of probing a stream
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Parsed identification
    pub identity: DeviceIdentity,
    /// Raw response line
    pub raw: String,
}

/// A detected device and the port it answered on
#[derive(Debug, Clone)]
pub struct DetectedDevice {
    pub port: String,
    pub identity: DeviceIdentity,
}

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for the device-id response
    pub timeout: Duration,
    /// Delay after opening a port before the probe is sent
    pub settle_delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            settle_delay: Duration::from_millis(50),
        }
    }
}

/// Rad Pro device prober
pub struct DeviceProber {
    config: ProbeConfig,
}

impl DeviceProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Send `GET deviceId` on a stream and check the answer
    pub async fn probe<S>(&self, stream: &mut S) -> Option<ProbeResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = format!("{}\n", encode_request(Field::DeviceId));
        trace!("Sending device id probe");

        if let Err(e) = stream.write_all(request.as_bytes()).await {
            warn!("Failed to write device id probe: {}", e);
            return None;
        }
        if let Err(e) = stream.flush().await {
            warn!("Failed to flush device id probe: {}", e);
            return None;
        }

        let line = self.read_line(stream).await?;
        trace!("Device id response: {:?}", line);

        match decode_response(&line, Field::DeviceId) {
            Ok(value) => {
                let identity = value.as_text().and_then(DeviceIdentity::parse)?;
                Some(ProbeResult {
                    identity,
                    raw: line,
                })
            }
            Err(e) => {
                debug!("Not a Rad Pro response: {}", e);
                None
            }
        }
    }

    /// Read one response line before the probe timeout expires
    async fn read_line<S>(&self, stream: &mut S) -> Option<String>
    where
        S: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + self.config.timeout;
        let mut codec = LineCodec::new();
        let mut buf = [0u8; 128];

        loop {
            if let Some(line) = codec.next_frame() {
                return Some(line);
            }
            match timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(Ok(n)) if n > 0 => codec.push_bytes(&buf[..n]),
                Ok(Ok(_)) => {
                    trace!("Stream closed during probe");
                    return None;
                }
                Ok(Err(e)) => {
                    trace!("Probe read error: {}", e);
                    return None;
                }
                Err(_) => {
                    trace!("Device id probe timeout");
                    return None;
                }
            }
        }
    }
}

impl Default for DeviceProber {
    fn default() -> Self {
        Self::new()
    }
}

/// Try each candidate in order and return the first that answers the probe
///
/// `open` is called at most once per candidate, in order, and never again
/// after a match. Every opened stream is shut down before moving on.
pub async fn detect_device<F, Fut, S>(
    candidates: &[String],
    prober: &DeviceProber,
    mut open: F,
) -> Result<DetectedDevice, DetectError>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<S, DetectError>>,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut tried = Vec::with_capacity(candidates.len());

    for port in candidates {
        tried.push(port.clone());

        let mut stream = match open(port).await {
            Ok(s) => s,
            Err(e) => {
                debug!("Skipping {}: {}", port, e);
                continue;
            }
        };

        if !prober.config.settle_delay.is_zero() {
            tokio::time::sleep(prober.config.settle_delay).await;
        }

        let result = prober.probe(&mut stream).await;
        let _ = stream.shutdown().await;
        drop(stream);

        if let Some(result) = result {
            info!(
                "Identified Rad Pro {} ({}) on {}",
                result.identity.device_id,
                result.identity.model().unwrap_or("unknown model"),
                port
            );
            return Ok(DetectedDevice {
                port: port.clone(),
                identity: result.identity,
            });
        }
    }

    Err(DetectError::DeviceNotFound { tried })
}

/// Open a serial port for probing
async fn open_serial(port: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream, DetectError> {
    use tokio_serial::SerialPortBuilderExt;

    tokio_serial::new(port, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|e| DetectError::OpenFailed {
            port: port.to_string(),
            reason: e.to_string(),
        })
}

/// Enumerate candidate ports and return the first Rad Pro device found
pub async fn auto_detect(baud_rate: u32) -> Result<DetectedDevice, DetectError> {
    let candidates = PortScanner::new().candidate_ports()?;
    let prober = DeviceProber::new();

    detect_device(&candidates, &prober, |port| {
        let port = port.to_string();
        async move { open_serial(&port, baud_rate).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use radpro_protocol::Field;
    use radpro_sim::{spawn_virtual_device, VirtualDevice, VirtualDeviceConfig};
    use std::sync::{Arc, Mutex};
    use tokio::io::DuplexStream;

    fn quick_prober() -> DeviceProber {
        DeviceProber::with_config(ProbeConfig {
            timeout: Duration::from_millis(200),
            settle_delay: Duration::ZERO,
        })
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_probe_identifies_device() {
        let link = spawn_virtual_device(VirtualDevice::new());
        let mut stream = link.stream;

        let result = quick_prober().probe(&mut stream).await.unwrap();
        assert_eq!(result.identity.device_id, "b5706d937087f975b5812810");
        assert_eq!(result.identity.model(), Some("FS2011"));
    }

    #[tokio::test]
    async fn test_probe_rejects_error_response() {
        let mut device = VirtualDevice::new();
        device.set_fault(Field::DeviceId, true);
        let mut stream = spawn_virtual_device(device).stream;

        assert!(quick_prober().probe(&mut stream).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_times_out_on_silent_port() {
        let mut device = VirtualDevice::new();
        device.set_mute(true);
        let mut stream = spawn_virtual_device(device).stream;

        assert!(quick_prober().probe(&mut stream).await.is_none());
    }

    #[tokio::test]
    async fn test_detect_selects_first_answering_candidate() {
        let candidates: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let opened = Arc::new(Mutex::new(Vec::<String>::new()));

        let log = opened.clone();
        let found = detect_device(&candidates, &quick_prober(), move |port| {
            log.lock().unwrap().push(port.to_string());
            let mut device = VirtualDevice::from_config(VirtualDeviceConfig {
                identity: format!("FS2011 (STM32F051C8);Rad Pro 2.0/en;device-{}", port),
                ..Default::default()
            });
            if port != "B" {
                device.set_fault(Field::DeviceId, true);
            }
            let stream: DuplexStream = spawn_virtual_device(device).stream;
            async move { Ok::<_, DetectError>(stream) }
        })
        .await
        .unwrap();

        assert_eq!(found.port, "B");
        assert_eq!(found.identity.device_id, "device-B");
        assert_eq!(*opened.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_detect_reports_not_found() {
        let candidates = vec!["/dev/ttyACM0".to_string(), "/dev/ttyACM1".to_string()];

        let err = detect_device(&candidates, &quick_prober(), |port| {
            let port = port.to_string();
            async move {
                Err::<DuplexStream, _>(DetectError::OpenFailed {
                    port,
                    reason: "No such file or directory".to_string(),
                })
            }
        })
        .await
        .unwrap_err();

        match err {
            DetectError::DeviceNotFound { tried } => assert_eq!(tried, candidates),
            other => panic!("Expected DeviceNotFound, got {other:?}"),
        }
    }
}
