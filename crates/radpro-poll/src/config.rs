//! Poller configuration

use std::time::Duration;

use radpro_protocol::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};

use crate::error::PollError;

/// Default scan interval in seconds
pub const DEFAULT_SCAN_INTERVAL_S: u64 = 2;
/// Default tube sensitivity refresh interval in seconds (1 hour)
pub const DEFAULT_SENSITIVITY_INTERVAL_S: u64 = 3600;
/// Default device id / battery refresh interval in seconds (10 minutes)
pub const DEFAULT_DEVICEINFO_INTERVAL_S: u64 = 600;
/// Default response timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 500;
/// Default rate averaging window in seconds
pub const DEFAULT_AVERAGING_WINDOW_S: u64 = 5;
/// Longest accepted rate averaging window in seconds
pub const MAX_AVERAGING_WINDOW_S: u64 = 300;
/// Default pause after each exchange in milliseconds
pub const DEFAULT_EXCHANGE_DELAY_MS: u64 = 50;

/// Which serial port to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSetting {
    /// Probe candidate ports for a Rad Pro device
    Auto,
    /// Use this port path
    Path(String),
}

impl PortSetting {
    /// Interpret a user-supplied port value
    ///
    /// `auto`, `none` and the empty string select auto-detection.
    pub fn parse(value: &str) -> Self {
        if radpro_detect::is_auto_port(value) {
            Self::Auto
        } else {
            Self::Path(value.trim().to_string())
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: PortSetting,
    pub baud_rate: u32,
    /// Response timeout for one exchange
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: PortSetting::Auto,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Polling coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between poll cycles
    pub scan_interval: Duration,
    /// How often the tube sensitivity is re-read
    pub sensitivity_interval: Duration,
    /// How often the device id and battery voltage are re-read
    pub device_info_interval: Duration,
    /// Length of the rate smoothing window (zero for instantaneous rates)
    pub averaging_window: Duration,
    /// Pause after each exchange before the next request
    pub exchange_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_S),
            sensitivity_interval: Duration::from_secs(DEFAULT_SENSITIVITY_INTERVAL_S),
            device_info_interval: Duration::from_secs(DEFAULT_DEVICEINFO_INTERVAL_S),
            averaging_window: Duration::from_secs(DEFAULT_AVERAGING_WINDOW_S),
            exchange_delay: Duration::from_millis(DEFAULT_EXCHANGE_DELAY_MS),
        }
    }
}

impl PollerConfig {
    /// Check that all intervals are usable
    pub fn validate(&self) -> Result<(), PollError> {
        if self.scan_interval < Duration::from_secs(1) {
            return Err(PollError::InvalidConfig(format!(
                "scan interval must be at least 1s, got {:?}",
                self.scan_interval
            )));
        }
        if self.sensitivity_interval.is_zero() || self.device_info_interval.is_zero() {
            return Err(PollError::InvalidConfig(
                "refresh intervals must be positive".to_string(),
            ));
        }
        if self.averaging_window > Duration::from_secs(MAX_AVERAGING_WINDOW_S) {
            return Err(PollError::InvalidConfig(format!(
                "averaging window must be at most {}s, got {:?}",
                MAX_AVERAGING_WINDOW_S, self.averaging_window
            )));
        }
        Ok(())
    }

    /// Number of cycles between tube sensitivity reads
    pub fn sensitivity_period(&self) -> u64 {
        cycles(self.sensitivity_interval, self.scan_interval)
    }

    /// Number of cycles between device id / battery reads
    pub fn device_info_period(&self) -> u64 {
        cycles(self.device_info_interval, self.scan_interval)
    }
}

/// Whole scan intervals in `interval`, at least one
fn cycles(interval: Duration, scan: Duration) -> u64 {
    let scan_s = scan.as_secs().max(1);
    (interval.as_secs() / scan_s).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_periods() {
        let config = PollerConfig::default();
        assert_eq!(config.sensitivity_period(), 1800);
        assert_eq!(config.device_info_period(), 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_period_never_zero() {
        let config = PollerConfig {
            scan_interval: Duration::from_secs(30),
            device_info_interval: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(config.device_info_period(), 1);
    }

    #[test]
    fn test_rejects_sub_second_scan() {
        let config = PollerConfig {
            scan_interval: Duration::from_millis(200),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PollError::InvalidConfig(_))));
    }

    #[test]
    fn test_averaging_window_is_capped() {
        let at_limit = PollerConfig {
            averaging_window: Duration::from_secs(MAX_AVERAGING_WINDOW_S),
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let too_long = PollerConfig {
            averaging_window: Duration::from_secs(MAX_AVERAGING_WINDOW_S + 1),
            ..Default::default()
        };
        assert!(matches!(too_long.validate(), Err(PollError::InvalidConfig(_))));
    }

    #[test]
    fn test_port_setting_parse() {
        assert_eq!(PortSetting::parse("auto"), PortSetting::Auto);
        assert_eq!(PortSetting::parse(""), PortSetting::Auto);
        assert_eq!(
            PortSetting::parse(" /dev/ttyACM0 "),
            PortSetting::Path("/dev/ttyACM0".to_string())
        );
    }
}
