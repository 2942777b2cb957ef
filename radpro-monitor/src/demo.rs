//! Simulated device for running the monitor without hardware

use std::time::Duration;

use radpro_poll::{ConnectionDescriptor, Connector, PollError, Transport};
use radpro_sim::{spawn_virtual_device, VirtualDevice, VirtualDeviceConfig};
use tokio::io::DuplexStream;
use tracing::info;

/// Typical background rate of an FS2011 tube
const BACKGROUND_CPS: f64 = 0.4;

/// Connects to a fresh virtual device on every call
pub struct SimulatedConnector {
    config: VirtualDeviceConfig,
    timeout: Duration,
}

impl SimulatedConnector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            config: VirtualDeviceConfig {
                pulse_rate_cps: BACKGROUND_CPS,
                ..Default::default()
            },
            timeout,
        }
    }
}

impl Connector for SimulatedConnector {
    type Io = DuplexStream;

    async fn connect(&mut self) -> Result<Transport<DuplexStream>, PollError> {
        let link = spawn_virtual_device(VirtualDevice::from_config(self.config.clone()));
        info!(
            "Attached virtual device at {} cps background",
            self.config.pulse_rate_cps
        );
        let descriptor = ConnectionDescriptor::new("virtual", 0, self.timeout);
        Ok(Transport::from_stream(descriptor, link.stream))
    }
}
