//! Data load descriptors and the values decoded from them.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use strum_macros::{Display, EnumIter, EnumString};

/// How the registers of a data load are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DataLoadType {
    /// One 16-bit register scaled by the configured scaler.
    #[strum(to_string = "Float16", serialize = "Float")]
    Float16,
    /// Two registers forming a 32-bit value, no configurable scaling.
    #[strum(to_string = "Float32", serialize = "Double")]
    Float32,
    /// One raw 16-bit register.
    Unsigned,
    /// A fixed-length octet string.
    String,
    /// The device real-time clock.
    Clock,
    /// Unknown or missing type. Never decodable.
    Unset,
}

impl DataLoadType {
    /// Parse a configured type name, falling back to [`DataLoadType::Unset`].
    pub fn from_config_name(name: &str) -> Self {
        name.trim().parse().unwrap_or(DataLoadType::Unset)
    }

    /// Whether values of this type carry a physical unit.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataLoadType::Float16 | DataLoadType::Float32 | DataLoadType::Unsigned
        )
    }
}

/// One configured measurement to be polled and published.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLoadDescriptor {
    pub name: String,
    pub address: u16,
    pub data_type: DataLoadType,
    pub unit: String,
    /// Kept wide so an out of range value is reported when decoding.
    pub scaler: i32,
    /// Bytes to read for [`DataLoadType::String`].
    pub string_length: u16,
    pub topic: String,
    pub polling_interval: Duration,
}

/// A decoded reading, ready to be published.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Float(f64),
    Unsigned(u16),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Measurement {
    /// Render the payload sent to the broker.
    pub fn payload(&self) -> String {
        match self {
            Measurement::Float(value) => value.to_string(),
            Measurement::Unsigned(value) => value.to_string(),
            Measurement::Text(text) => text.clone(),
            Measurement::Timestamp(time) => time.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
