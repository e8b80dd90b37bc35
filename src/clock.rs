//! The device real-time clock structure.

use chrono::{DateTime, NaiveDate, Utc};
use modular_bitfield::prelude::*;

use crate::error::TransportError;

/// Status byte reported alongside the device clock.
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockStatus {
    pub invalid_value: bool,
    pub doubtful_value: bool,
    pub different_clock_base: bool,
    pub invalid_clock_status: bool,
    #[skip]
    __: B3,
    pub daylight_saving_active: bool,
}

/// Clock structure as laid out by the meter.
///
/// On the wire this is 12 packed bytes; `year` and `deviation` are sent
/// high byte first, every other field is a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmiClock {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
    /// Deviation from UTC in minutes.
    pub deviation: i16,
    pub status: ClockStatus,
}

impl EmiClock {
    pub const WIRE_LEN: usize = 12;

    pub fn from_wire_bytes(bytes: &[u8; Self::WIRE_LEN]) -> Self {
        Self {
            year: u16::from_be_bytes([bytes[0], bytes[1]]),
            month: bytes[2],
            day: bytes[3],
            weekday: bytes[4],
            hour: bytes[5],
            minute: bytes[6],
            second: bytes[7],
            hundredths: bytes[8],
            deviation: i16::from_be_bytes([bytes[9], bytes[10]]),
            status: ClockStatus::from_bytes([bytes[11]]),
        }
    }

    pub fn to_wire_bytes(&self) -> [u8; Self::WIRE_LEN] {
        let year = self.year.to_be_bytes();
        let deviation = self.deviation.to_be_bytes();
        [
            year[0],
            year[1],
            self.month,
            self.day,
            self.weekday,
            self.hour,
            self.minute,
            self.second,
            self.hundredths,
            deviation[0],
            deviation[1],
            self.status.into_bytes()[0],
        ]
    }

    /// Interpret the clock as a UTC timestamp.
    ///
    /// Hundredths of a second become milliseconds. The deviation field is
    /// reported by the meter but not applied.
    pub fn to_utc(&self) -> Result<DateTime<Utc>, TransportError> {
        if self.hundredths > 99 {
            return Err(TransportError::InvalidClock);
        }
        NaiveDate::from_ymd_opt(i32::from(self.year), self.month.into(), self.day.into())
            .and_then(|date| {
                date.and_hms_milli_opt(
                    self.hour.into(),
                    self.minute.into(),
                    self.second.into(),
                    u32::from(self.hundredths) * 10,
                )
            })
            .map(|naive| naive.and_utc())
            .ok_or(TransportError::InvalidClock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(hundredths: u8) -> EmiClock {
        EmiClock {
            year: 2024,
            month: 1,
            day: 15,
            weekday: 1,
            hour: 10,
            minute: 30,
            second: 0,
            hundredths,
            deviation: 0,
            status: ClockStatus::new(),
        }
    }

    #[test]
    fn test_clock_to_utc() {
        let time = clock(50).to_utc().unwrap();
        assert_eq!(
            time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2024-01-15T10:30:00.500Z"
        );
    }

    #[test]
    fn test_clock_from_wire() {
        let bytes = [
            0x07, 0xE8, // 2024
            0x01, 0x0F, 0x01, 0x0A, 0x1E, 0x00, 0x32, //
            0xFF, 0xC4, // -60
            0x81,
        ];
        let clock = EmiClock::from_wire_bytes(&bytes);
        assert_eq!(clock.year, 2024);
        assert_eq!(clock.month, 1);
        assert_eq!(clock.day, 15);
        assert_eq!(clock.hour, 10);
        assert_eq!(clock.minute, 30);
        assert_eq!(clock.hundredths, 50);
        assert_eq!(clock.deviation, -60);
        assert!(clock.status.invalid_value());
        assert!(!clock.status.doubtful_value());
        assert!(clock.status.daylight_saving_active());
        assert_eq!(clock.to_wire_bytes(), bytes);
    }

    #[test]
    fn test_invalid_calendar_fields() {
        let mut bad = clock(0);
        bad.month = 13;
        assert!(matches!(bad.to_utc(), Err(TransportError::InvalidClock)));

        // 0xFF is "not specified" on these meters.
        let mut bad = clock(0);
        bad.hour = 0xFF;
        assert!(matches!(bad.to_utc(), Err(TransportError::InvalidClock)));

        let mut bad = clock(0);
        bad.hundredths = 100;
        assert!(matches!(bad.to_utc(), Err(TransportError::InvalidClock)));
    }
}
