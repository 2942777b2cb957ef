//! Device identification parsing
//!
//! The `deviceId` payload is `<hardware-id>;<software-id>;<device-id>`:
//!
//! ```text
//! FS2011 (STM32F051C8);Rad Pro 2.0/en;b5706d937087f975b5812810
//! ```
//!
//! Older firmware reports only the bare device id.

/// Identification reported by the device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceIdentity {
    /// Hardware description, e.g. `FS2011 (STM32F051C8)`
    pub hardware_id: Option<String>,
    /// Firmware description, e.g. `Rad Pro 2.0/en`
    pub software_id: Option<String>,
    /// Unique device id
    pub device_id: String,
}

impl DeviceIdentity {
    /// Parse a `deviceId` payload
    ///
    /// Returns `None` for an empty payload. Payloads with two fields, or
    /// more than three, keep the last field as the device id.
    pub fn parse(payload: &str) -> Option<Self> {
        let parts: Vec<&str> = payload.split(';').map(str::trim).collect();

        match parts.as_slice() {
            [] | [""] => None,
            [id] => Some(Self {
                hardware_id: None,
                software_id: None,
                device_id: (*id).to_string(),
            }),
            [hardware, rest @ ..] => {
                let device_id = rest.last().copied().unwrap_or_default();
                let software = if rest.len() >= 2 { Some(rest[0]) } else { None };
                Some(Self {
                    hardware_id: non_empty(hardware),
                    software_id: software.and_then(non_empty),
                    device_id: device_id.to_string(),
                })
            }
        }
    }

    /// Model name: the hardware id up to the MCU description
    ///
    /// `FS2011 (STM32F051C8)` becomes `FS2011`.
    pub fn model(&self) -> Option<&str> {
        self.hardware_id
            .as_deref()
            .map(|hw| hw.split('(').next().unwrap_or(hw).trim())
            .filter(|m| !m.is_empty())
    }

    /// Firmware version: `Rad Pro 2.0/en` becomes `2.0`
    pub fn software_version(&self) -> Option<&str> {
        let software = self.software_id.as_deref()?;
        for part in software.split_whitespace() {
            if let Some((version, _)) = part.split_once('/') {
                return Some(version);
            }
            if part.starts_with(|c: char| c.is_ascii_digit()) {
                return Some(part);
            }
        }
        Some(software)
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_identity() {
        let id =
            DeviceIdentity::parse("FS2011 (STM32F051C8);Rad Pro 2.0/en;b5706d937087f975b5812810")
                .unwrap();

        assert_eq!(id.hardware_id.as_deref(), Some("FS2011 (STM32F051C8)"));
        assert_eq!(id.software_id.as_deref(), Some("Rad Pro 2.0/en"));
        assert_eq!(id.device_id, "b5706d937087f975b5812810");
        assert_eq!(id.model(), Some("FS2011"));
        assert_eq!(id.software_version(), Some("2.0"));
    }

    #[test]
    fn test_parse_bare_id() {
        let id = DeviceIdentity::parse("b5706d937087").unwrap();
        assert_eq!(id.device_id, "b5706d937087");
        assert!(id.model().is_none());
        assert!(id.software_version().is_none());
    }

    #[test]
    fn test_parse_empty() {
        assert!(DeviceIdentity::parse("").is_none());
    }

    #[test]
    fn test_version_without_slash() {
        let id = DeviceIdentity::parse("Bosean FS-600;Rad Pro 3.1;abc").unwrap();
        assert_eq!(id.software_version(), Some("3.1"));
        assert_eq!(id.model(), Some("Bosean FS-600"));
    }
}
