//! Rad Pro Serial Port Detection Library
//!
//! This crate provides serial port enumeration and device-id probing for
//! Geiger counters running the Rad Pro firmware.
//!
//! Detection is deliberately simple: candidate ports are those whose names
//! match the usual USB CDC/serial patterns, tried in a stable order. The first
//! one that answers `GET deviceId` with `OK ...` wins.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), radpro_detect::DetectError> {
//! use radpro_detect::auto_detect;
//!
//! let found = auto_detect(115_200).await?;
//! println!("Rad Pro {} on {}", found.identity.device_id, found.port);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;

pub use error::DetectError;
pub use probe::{
    auto_detect, detect_device, DetectedDevice, DeviceProber, ProbeConfig, ProbeResult,
};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo, CANDIDATE_PREFIXES};

/// Returns true if a configured port value asks for auto-detection
///
/// Accepts `auto` (any case), an empty string, or `none`.
pub fn is_auto_port(port: &str) -> bool {
    let port = port.trim();
    port.is_empty() || port.eq_ignore_ascii_case("auto") || port.eq_ignore_ascii_case("none")
}

#[cfg(test)]
mod tests {
    use super::is_auto_port;

    #[test]
    fn test_auto_port_values() {
        assert!(is_auto_port("auto"));
        assert!(is_auto_port("AUTO"));
        assert!(is_auto_port(""));
        assert!(is_auto_port("none"));
        assert!(!is_auto_port("/dev/ttyACM0"));
    }
}
