//! Device fields and their typed values
//!
//! Every request on the wire names one of a fixed set of fields. The field
//! also decides how the payload of the `OK` response is interpreted.

use std::fmt;

/// A readable device field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Field {
    /// Hardware, software and unique device identification
    DeviceId,
    /// Lifetime cumulative Geiger tube pulse count
    TubePulseCount,
    /// Tube calibration constant in CPM per µSv/h
    TubeSensitivity,
    /// Battery voltage per cell
    DeviceBatteryVoltage,
}

/// How a field's payload is parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Unsigned integer counter
    Count,
    /// Finite floating point number
    Float,
    /// Free-form text
    Text,
}

impl Field {
    /// All fields, in the order they are listed by the firmware documentation
    pub const ALL: [Field; 4] = [
        Field::DeviceId,
        Field::TubePulseCount,
        Field::TubeSensitivity,
        Field::DeviceBatteryVoltage,
    ];

    /// Wire token used in `GET <token>`
    pub fn token(&self) -> &'static str {
        match self {
            Field::DeviceId => "deviceId",
            Field::TubePulseCount => "tubePulseCount",
            Field::TubeSensitivity => "tubeSensitivity",
            Field::DeviceBatteryVoltage => "deviceBatteryVoltage",
        }
    }

    /// Look up a field by its wire token
    pub fn from_token(token: &str) -> Option<Field> {
        Self::ALL.into_iter().find(|f| f.token() == token)
    }

    /// Value type carried by this field's response
    pub fn kind(&self) -> ValueKind {
        match self {
            Field::DeviceId => ValueKind::Text,
            Field::TubePulseCount => ValueKind::Count,
            Field::TubeSensitivity | Field::DeviceBatteryVoltage => ValueKind::Float,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Parsed response payload
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Count(u64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Value::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lookup() {
        for field in Field::ALL {
            assert_eq!(Field::from_token(field.token()), Some(field));
        }
        assert_eq!(Field::from_token("tubepulsecount"), None);
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(Field::TubePulseCount.kind(), ValueKind::Count);
        assert_eq!(Field::TubeSensitivity.kind(), ValueKind::Float);
        assert_eq!(Field::DeviceId.kind(), ValueKind::Text);
    }
}
