//! Virtual device actor task
//!
//! This module serves a [`VirtualDevice`] over an async stream. The task uses
//! a select! loop to:
//! - Read request lines from the stream and write back responses
//! - Apply control commands (pulses, faults, reboot, disconnect) from a channel

use std::io;

use radpro_protocol::{Field, LineCodec, ProtocolCodec};
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::VirtualDevice;

/// Commands that can be sent to a virtual device task
#[derive(Debug, Clone)]
pub enum DeviceCommand {
    /// Register detected pulses
    AddPulses(u64),
    /// Power cycle the device (counter restarts from zero)
    Reboot,
    /// Answer requests for a field with `ERROR`
    SetFault { field: Field, enabled: bool },
    /// Stop answering requests without closing the link
    SetMute(bool),
    /// Change the reported tube sensitivity
    SetSensitivity(f64),
    /// Drop the link, as if the USB cable was pulled
    Disconnect,
}

/// Handles to a spawned virtual device
pub struct VirtualDeviceLink {
    /// Host side of the serial link
    pub stream: DuplexStream,
    /// Control channel
    pub commands: mpsc::Sender<DeviceCommand>,
    /// Resolves to the device once the link closes
    pub task: JoinHandle<io::Result<VirtualDevice>>,
}

/// Run the virtual device task
///
/// Returns the device when the peer closes the stream or a
/// [`DeviceCommand::Disconnect`] is received, so its state can be carried
/// into a new link.
pub async fn run_virtual_device_task<S>(
    mut stream: S,
    mut device: VirtualDevice,
    mut cmd_rx: mpsc::Receiver<DeviceCommand>,
) -> io::Result<VirtualDevice>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 256];
    let mut commands_open = true;

    info!("Starting virtual Rad Pro device task");

    loop {
        tokio::select! {
            // Control commands first so a request sees every earlier command
            biased;

            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(DeviceCommand::AddPulses(n)) => device.add_pulses(n),
                    Some(DeviceCommand::Reboot) => device.reboot(),
                    Some(DeviceCommand::SetFault { field, enabled }) => {
                        device.set_fault(field, enabled)
                    }
                    Some(DeviceCommand::SetMute(mute)) => device.set_mute(mute),
                    Some(DeviceCommand::SetSensitivity(s)) => device.set_tube_sensitivity(s),
                    Some(DeviceCommand::Disconnect) => {
                        info!("Virtual device disconnecting");
                        break;
                    }
                    None => commands_open = false,
                }
            }

            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual device stream closed by peer");
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        while let Some(line) = codec.next_frame() {
                            debug!("Virtual device RX: {}", line);
                            if let Some(response) = device.handle_line(&line) {
                                debug!("Virtual device TX: {}", response);
                                stream.write_all(response.as_bytes()).await?;
                                stream.write_all(b"\r\n").await?;
                                stream.flush().await?;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Virtual device stream error: {}", e);
                        return Err(e);
                    }
                }
            }
        }
    }

    Ok(device)
}

/// Spawn a virtual device on an in-memory serial link
pub fn spawn_virtual_device(device: VirtualDevice) -> VirtualDeviceLink {
    let (host_side, device_side) = duplex(1024);
    let (commands, cmd_rx) = mpsc::channel(32);
    let task = tokio::spawn(run_virtual_device_task(device_side, device, cmd_rx));

    VirtualDeviceLink {
        stream: host_side,
        commands,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncBufReadExt;

    async fn request(
        reader: &mut tokio::io::BufReader<DuplexStream>,
        line: &str,
    ) -> String {
        reader.get_mut().write_all(line.as_bytes()).await.unwrap();
        reader.get_mut().write_all(b"\n").await.unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_millis(100), reader.read_line(&mut response))
            .await
            .unwrap()
            .unwrap();
        response.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_serves_requests() {
        let link = spawn_virtual_device(VirtualDevice::new());
        let mut reader = tokio::io::BufReader::new(link.stream);

        link.commands.send(DeviceCommand::AddPulses(7)).await.unwrap();

        assert_eq!(request(&mut reader, "GET tubePulseCount").await, "OK 7");
        assert_eq!(request(&mut reader, "GET tubeSensitivity").await, "OK 153.8");

        drop(reader);
        let device = link.task.await.unwrap().unwrap();
        assert_eq!(device.pulse_count(), 7);
    }

    #[tokio::test]
    async fn test_disconnect_closes_stream() {
        let link = spawn_virtual_device(VirtualDevice::new());
        let mut stream = link.stream;

        link.commands.send(DeviceCommand::Disconnect).await.unwrap();
        let device = link.task.await.unwrap().unwrap();
        assert_eq!(device.requests(), 0);

        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
