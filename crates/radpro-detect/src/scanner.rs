//! Serial port scanner
//!
//! This module enumerates serial ports and orders the ones that look like a
//! USB-attached Rad Pro device.

use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::DetectError;

/// Port name prefixes tried by auto-detection, in priority order
pub const CANDIDATE_PREFIXES: [&str; 4] = [
    // Linux USB CDC ACM (most Rad Pro conversions)
    "/dev/ttyACM",
    // Linux USB-serial bridges (CH340, CP210x)
    "/dev/ttyUSB",
    // macOS
    "/dev/cu.usbmodem",
    "/dev/cu.usbserial",
];

/// Information about a serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyACM0)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Port name with USB ids and product string when known
    ///
    /// e.g. `/dev/ttyACM0 [0483:5740 Rad Pro]`
    pub fn describe(&self) -> String {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => format!(
                "{} [{:04x}:{:04x} {}]",
                self.port,
                vid,
                pid,
                self.product.as_deref().unwrap_or("unknown product")
            ),
            _ => self.port.clone(),
        }
    }

    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                product: None,
            },
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Name prefixes of candidate ports, highest priority first
    pub candidate_prefixes: Vec<String>,
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            candidate_prefixes: CANDIDATE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            // Bluetooth ports on macOS
            skip_patterns: vec!["Bluetooth".to_string()],
        }
    }
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig::default(),
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate all available serial ports
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        debug!("Enumerating serial ports...");
        let ports = available_ports()?;

        Ok(ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(&p.port))
            .collect())
    }

    /// Enumerate ports and return the auto-detection candidates in probe order
    pub fn candidate_ports(&self) -> Result<Vec<String>, DetectError> {
        let ports = self.enumerate_ports()?;
        let candidates = self.order_candidates(ports.iter().map(|p| p.port.clone()));

        if candidates.is_empty() {
            info!("No candidate serial ports found");
        } else {
            let described: Vec<String> = candidates
                .iter()
                .filter_map(|name| ports.iter().find(|p| &p.port == name))
                .map(SerialPortInfo::describe)
                .collect();
            info!(
                "Found {} candidate port(s): {}",
                candidates.len(),
                described.join(", ")
            );
        }

        Ok(candidates)
    }

    /// Order port names by prefix priority, then by name
    ///
    /// Names matching no prefix are dropped, duplicates keep their first
    /// position.
    pub fn order_candidates(&self, names: impl IntoIterator<Item = String>) -> Vec<String> {
        let names: Vec<String> = names
            .into_iter()
            .filter(|n| !self.should_skip_port(n))
            .collect();

        let mut ordered: Vec<String> = Vec::new();
        for prefix in &self.config.candidate_prefixes {
            let mut matching: Vec<&String> =
                names.iter().filter(|n| n.starts_with(prefix.as_str())).collect();
            matching.sort();

            for name in matching {
                if !ordered.contains(name) {
                    ordered.push(name.clone());
                }
            }
        }
        ordered
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &str) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serialport::UsbPortInfo;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x0483,
            pid: 0x5740,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("STMicroelectronics".to_string()),
            product: Some("Rad Pro".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x0483));
        assert_eq!(info.pid, Some(0x5740));
        assert_eq!(info.describe(), "/dev/ttyACM0 [0483:5740 Rad Pro]");
    }

    #[test]
    fn test_describe_non_usb_port() {
        let info =
            SerialPortInfo::from_serialport("/dev/ttyS0".to_string(), &SerialPortType::Unknown);
        assert_eq!(info.describe(), "/dev/ttyS0");
    }

    #[test]
    fn test_candidates_ordered_by_prefix_then_name() {
        let scanner = PortScanner::new();
        let ordered = scanner.order_candidates(names(&[
            "/dev/ttyUSB0",
            "/dev/ttyS0",
            "/dev/ttyACM1",
            "/dev/cu.usbmodem1101",
            "/dev/ttyACM0",
        ]));

        assert_eq!(
            ordered,
            names(&[
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyUSB0",
                "/dev/cu.usbmodem1101"
            ])
        );
    }

    #[test]
    fn test_candidates_deduplicated_and_skipped() {
        let scanner = PortScanner::with_config(ScannerConfig {
            candidate_prefixes: names(&["/dev/cu."]),
            skip_patterns: names(&["Bluetooth"]),
        });
        let ordered = scanner.order_candidates(names(&[
            "/dev/cu.usbmodem1",
            "/dev/cu.Bluetooth-Incoming-Port",
            "/dev/cu.usbmodem1",
        ]));

        assert_eq!(ordered, names(&["/dev/cu.usbmodem1"]));
    }

    proptest! {
        #[test]
        fn ordered_candidates_are_unique_matching_and_prefix_ranked(
            names in prop::collection::vec(
                prop_oneof![
                    "/dev/ttyACM[0-9]",
                    "/dev/ttyUSB[0-9]",
                    "/dev/cu\\.usbmodem[0-9]{1,4}",
                    "/dev/ttyS[0-9]",
                    "/dev/cu\\.Bluetooth-[a-z]{1,6}",
                ],
                0..12,
            )
        ) {
            let scanner = PortScanner::new();
            let ordered = scanner.order_candidates(names.clone());

            let rank = |name: &str| CANDIDATE_PREFIXES.iter().position(|p| name.starts_with(p));
            for (i, name) in ordered.iter().enumerate() {
                prop_assert!(names.contains(name));
                prop_assert!(rank(name.as_str()).is_some());
                prop_assert!(!name.contains("Bluetooth"));
                prop_assert!(!ordered[i + 1..].contains(name));
            }
            for pair in ordered.windows(2) {
                prop_assert!((rank(pair[0].as_str()), &pair[0]) < (rank(pair[1].as_str()), &pair[1]));
            }

            let expected = names
                .iter()
                .filter(|n| rank(n.as_str()).is_some() && !n.contains("Bluetooth"))
                .collect::<std::collections::HashSet<_>>()
                .len();
            prop_assert_eq!(ordered.len(), expected);
        }
    }
}
