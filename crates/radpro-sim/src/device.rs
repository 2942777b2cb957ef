//! Virtual Rad Pro device
//!
//! Answers `GET` requests with the same line format as the firmware. The
//! pulse counter only moves when told to ([`VirtualDevice::add_pulses`]) or
//! when a background rate is configured, which keeps tests deterministic.

use std::collections::HashSet;

use radpro_protocol::Field;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Configuration for creating a virtual device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    /// Full `deviceId` payload
    pub identity: String,
    /// Tube sensitivity in CPM per µSv/h
    pub tube_sensitivity: f64,
    /// Battery voltage per cell
    pub battery_voltage: f64,
    /// Pulse counter value at power-on
    pub initial_pulse_count: u64,
    /// Background pulse rate accrued between reads (counts per second)
    pub pulse_rate_cps: f64,
}

impl Default for VirtualDeviceConfig {
    fn default() -> Self {
        Self {
            identity: "FS2011 (STM32F051C8);Rad Pro 2.0/en;b5706d937087f975b5812810".to_string(),
            tube_sensitivity: 153.8,
            battery_voltage: 1.32,
            initial_pulse_count: 0,
            pulse_rate_cps: 0.0,
        }
    }
}

/// A simulated Rad Pro Geiger counter
#[derive(Debug)]
pub struct VirtualDevice {
    config: VirtualDeviceConfig,
    pulse_count: u64,
    /// Sub-pulse remainder of the background rate
    fraction: f64,
    last_accrual: Instant,
    /// Fields answered with `ERROR`
    faults: HashSet<Field>,
    /// When set, requests are swallowed without a reply
    mute: bool,
    requests: u64,
}

impl VirtualDevice {
    /// Create a virtual device with default settings
    pub fn new() -> Self {
        Self::from_config(VirtualDeviceConfig::default())
    }

    /// Create a virtual device from configuration
    pub fn from_config(config: VirtualDeviceConfig) -> Self {
        Self {
            pulse_count: config.initial_pulse_count,
            config,
            fraction: 0.0,
            last_accrual: Instant::now(),
            faults: HashSet::new(),
            mute: false,
            requests: 0,
        }
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    /// Number of requests received so far, answered or not
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Register `n` detected pulses
    pub fn add_pulses(&mut self, n: u64) {
        self.pulse_count = self.pulse_count.saturating_add(n);
    }

    /// Simulate a power cycle: the lifetime counter restarts from zero
    pub fn reboot(&mut self) {
        debug!("Virtual device rebooting (counter was {})", self.pulse_count);
        self.pulse_count = 0;
        self.fraction = 0.0;
        self.last_accrual = Instant::now();
    }

    pub fn set_tube_sensitivity(&mut self, sensitivity: f64) {
        self.config.tube_sensitivity = sensitivity;
    }

    pub fn set_battery_voltage(&mut self, volts: f64) {
        self.config.battery_voltage = volts;
    }

    pub fn set_pulse_rate(&mut self, cps: f64) {
        self.accrue();
        self.config.pulse_rate_cps = cps.max(0.0);
    }

    /// Answer requests for `field` with `ERROR` while `enabled`
    pub fn set_fault(&mut self, field: Field, enabled: bool) {
        if enabled {
            self.faults.insert(field);
        } else {
            self.faults.remove(&field);
        }
    }

    /// Stop (or resume) answering requests
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    /// Process one request line and produce the response line
    ///
    /// Returns `None` when the device is muted.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        self.requests += 1;
        if self.mute {
            debug!("Virtual device muted, ignoring {:?}", line);
            return None;
        }

        let Some(field) = line
            .trim()
            .strip_prefix("GET ")
            .and_then(|token| Field::from_token(token.trim()))
        else {
            return Some("ERROR".to_string());
        };

        if self.faults.contains(&field) {
            return Some("ERROR".to_string());
        }

        let payload = match field {
            Field::DeviceId => self.config.identity.clone(),
            Field::TubePulseCount => {
                self.accrue();
                self.pulse_count.to_string()
            }
            Field::TubeSensitivity => format!("{}", self.config.tube_sensitivity),
            Field::DeviceBatteryVoltage => format!("{:.3}", self.config.battery_voltage),
        };

        Some(format!("OK {}", payload))
    }

    /// Fold the background rate into the counter
    fn accrue(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_accrual).as_secs_f64();
        self.last_accrual = now;

        if self.config.pulse_rate_cps > 0.0 {
            self.fraction += self.config.pulse_rate_cps * elapsed;
            let whole = self.fraction.floor();
            self.fraction -= whole;
            self.pulse_count = self.pulse_count.saturating_add(whole as u64);
        }
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}
