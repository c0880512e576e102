//! Typed packets decoded from device frames and commands sent to it.

use serde::{Deserialize, Serialize};

use super::version::{CommandKind, PacketCategory};
use crate::error::{LinkError, Result};

/// Wall-clock time as the meter understands it.
///
/// Frames carry the year as an offset from 2000 in a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    /// Only present where the revision carries seconds.
    pub second: Option<u8>,
}

/// First year a frame can represent.
pub const YEAR_BASE: u16 = 2000;

impl Timestamp {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second: None,
        }
    }

    pub fn with_second(mut self, second: u8) -> Self {
        self.second = Some(second);
        self
    }

    /// Pull every field into the range a frame can carry.
    pub fn clamped(self) -> Self {
        Self {
            year: self.year.clamp(YEAR_BASE, YEAR_BASE + 255),
            month: self.month.clamp(1, 12),
            day: self.day.clamp(1, 31),
            hour: self.hour.min(23),
            minute: self.minute.min(59),
            second: self.second.map(|s| s.min(59)),
        }
    }

    /// Year as the one-byte offset used on the wire.
    pub fn year_offset(&self) -> Result<u8> {
        self.year
            .checked_sub(YEAR_BASE)
            .and_then(|offset| u8::try_from(offset).ok())
            .ok_or_else(|| {
                LinkError::Encode(format!(
                    "year {} outside {}..={}",
                    self.year,
                    YEAR_BASE,
                    YEAR_BASE + 255
                ))
            })
    }

    pub(crate) fn from_wire(fields: &[u8], second: Option<u8>) -> Self {
        Self {
            year: YEAR_BASE + u16::from(fields[0]),
            month: fields[1],
            day: fields[2],
            hour: fields[3],
            minute: fields[4],
            second,
        }
    }
}

/// Identity and battery state reported once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfoRecord {
    pub protocol_code: u8,
    pub client_code: u8,
    pub model_code: u8,
    pub type_code: u8,
    pub battery_percent: u8,
    /// Serial number or rolling code, width per revision.
    pub code: Vec<u8>,
}

/// One stored glucose reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementRecord {
    pub timestamp: Timestamp,
    /// Little-endian on the wire, unit-less at this layer.
    pub glucose_raw: u16,
    pub retain: u8,
}

impl MeasurementRecord {
    #[inline]
    pub fn is_retained(&self) -> bool {
        self.retain != 0
    }
}

/// No more results follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndMarker {
    /// Absent in V1.
    pub retain: Option<u8>,
}

/// V3.1 timing packet: the meter asks for the host clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingRecord {
    pub code: u16,
}

/// A decoded device → host frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Info(DeviceInfoRecord),
    Timing(TimingRecord),
    Result(MeasurementRecord),
    End(EndMarker),
}

impl Packet {
    pub fn category(&self) -> PacketCategory {
        match self {
            Packet::Info(_) => PacketCategory::Info,
            Packet::Timing(_) => PacketCategory::Timing,
            Packet::Result(_) => PacketCategory::Result,
            Packet::End(_) => PacketCategory::End,
        }
    }
}

/// A decoded host → device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_offset() {
        assert_eq!(Timestamp::new(2024, 5, 1, 8, 30).year_offset().unwrap(), 24);
        assert_eq!(Timestamp::new(2000, 1, 1, 0, 0).year_offset().unwrap(), 0);
        assert_eq!(Timestamp::new(2255, 1, 1, 0, 0).year_offset().unwrap(), 255);
    }

    #[test]
    fn test_year_offset_out_of_range() {
        assert!(Timestamp::new(1999, 12, 31, 23, 59).year_offset().is_err());
        assert!(Timestamp::new(2256, 1, 1, 0, 0).year_offset().is_err());
    }

    #[test]
    fn test_clamped() {
        let wild = Timestamp::new(1980, 0, 40, 25, 61).with_second(99);
        let ts = wild.clamped();
        assert_eq!(ts, Timestamp::new(2000, 1, 31, 23, 59).with_second(59));
        assert!(ts.year_offset().is_ok());
    }

    #[test]
    fn test_from_wire() {
        let ts = Timestamp::from_wire(&[24, 3, 15, 7, 45], Some(9));
        assert_eq!(ts, Timestamp::new(2024, 3, 15, 7, 45).with_second(9));
    }

    #[test]
    fn test_retain_flag() {
        let record = MeasurementRecord {
            timestamp: Timestamp::new(2024, 1, 1, 0, 0),
            glucose_raw: 120,
            retain: 0,
        };
        assert!(!record.is_retained());
        assert!(MeasurementRecord { retain: 1, ..record }.is_retained());
    }
}
