//! Protocol descriptors, one per framing revision.
//!
//! Every revision shares the same envelope:
//! ```text
//! ┌────────────┬────────┬──────────┬─────────────┬──────────────┐
//! │ Start code │ Length │ Category │ Body        │ Checksum     │
//! │ 1 byte     │ 1 byte │ 1 byte   │ per table   │ 3 (V1) or 1  │
//! └────────────┴────────┴──────────┴─────────────┴──────────────┘
//! ```
//!
//! The descriptor carries everything that differs between revisions: frame
//! sizes per category, the end/handshake category codes and the checksum
//! rule. It is selected once when a session is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::checksum::ChecksumPolicy;
use crate::error::LinkError;

/// Start code of every device → host frame.
pub const DEVICE_START_CODE: u8 = 0x55;

/// Start code of every host → device command.
pub const HOST_START_CODE: u8 = 0xAA;

/// Start code, length byte and category byte.
pub const ENVELOPE_SIZE: usize = 3;

/// Protocol/client/model/type codes plus battery, ahead of the serial code.
pub const INFO_FIXED_FIELDS: usize = 5;

/// Category byte values.
pub mod category {
    /// Device information.
    pub const INFO: u8 = 0x00;
    /// V3.1 timing packet, and the host's time-sync answer to it.
    pub const TIMING: u8 = 0x02;
    /// One measurement record, and the host's data request.
    pub const RESULT: u8 = 0x03;
    /// End marker in V1.
    pub const END_LEGACY: u8 = 0x04;
    /// End marker in V2 and later.
    pub const END: u8 = 0x05;
    /// Session-opening handshake in V3.x.
    pub const HANDSHAKE: u8 = 0x09;
}

/// Framing revision spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
    #[serde(rename = "v3.1")]
    V3_1,
    #[serde(rename = "v3.2")]
    V3_2,
}

impl ProtocolVersion {
    /// All supported revisions, oldest first.
    pub const ALL: [ProtocolVersion; 4] = [
        ProtocolVersion::V1,
        ProtocolVersion::V2,
        ProtocolVersion::V3_1,
        ProtocolVersion::V3_2,
    ];

    /// Frame table and checksum rule for this revision.
    pub fn descriptor(self) -> &'static ProtocolDescriptor {
        match self {
            ProtocolVersion::V1 => &V1,
            ProtocolVersion::V2 => &V2,
            ProtocolVersion::V3_1 => &V3_1,
            ProtocolVersion::V3_2 => &V3_2,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
            ProtocolVersion::V3_1 => "v3.1",
            ProtocolVersion::V3_2 => "v3.2",
        };
        f.write_str(name)
    }
}

impl FromStr for ProtocolVersion {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(ProtocolVersion::V1),
            "v2" | "2" => Ok(ProtocolVersion::V2),
            "v3.1" | "3.1" => Ok(ProtocolVersion::V3_1),
            "v3.2" | "3.2" => Ok(ProtocolVersion::V3_2),
            other => Err(LinkError::InvalidConfig(format!(
                "unknown protocol version: {}",
                other
            ))),
        }
    }
}

/// Device → host packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketCategory {
    Info,
    Timing,
    Result,
    End,
}

/// Host → device command type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Opens the exchange (info request or handshake, per revision).
    InfoRequest,
    /// Pulls the next stored record.
    DataRequest,
    /// Answers a V3.1 timing packet with the host clock.
    TimeSync,
}

/// Everything that differs between framing revisions.
#[derive(Debug, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    pub version: ProtocolVersion,
    pub info_len: usize,
    pub result_len: usize,
    pub end_len: usize,
    /// Only V3.1 has a timing packet.
    pub timing_len: Option<usize>,
    pub end_code: u8,
    /// Category of the command that opens the exchange.
    pub open_code: u8,
    pub checksum: ChecksumPolicy,
    /// Commands carry seconds after the minute.
    pub command_seconds: bool,
    /// End packet carries a retain byte.
    pub end_has_retain: bool,
}

static V1: ProtocolDescriptor = ProtocolDescriptor {
    version: ProtocolVersion::V1,
    info_len: 16,
    result_len: 14,
    end_len: 6,
    timing_len: None,
    end_code: category::END_LEGACY,
    open_code: category::INFO,
    checksum: ChecksumPolicy::RunningSum,
    command_seconds: true,
    end_has_retain: false,
};

static V2: ProtocolDescriptor = ProtocolDescriptor {
    version: ProtocolVersion::V2,
    info_len: 15,
    result_len: 12,
    end_len: 5,
    timing_len: None,
    end_code: category::END,
    open_code: category::INFO,
    checksum: ChecksumPolicy::SumPlusTwo,
    command_seconds: false,
    end_has_retain: true,
};

static V3_1: ProtocolDescriptor = ProtocolDescriptor {
    version: ProtocolVersion::V3_1,
    info_len: 15,
    result_len: 12,
    end_len: 5,
    timing_len: Some(6),
    end_code: category::END,
    open_code: category::HANDSHAKE,
    checksum: ChecksumPolicy::SumPlusTwo,
    command_seconds: false,
    end_has_retain: true,
};

static V3_2: ProtocolDescriptor = ProtocolDescriptor {
    version: ProtocolVersion::V3_2,
    info_len: 18,
    result_len: 12,
    end_len: 5,
    timing_len: None,
    end_code: category::END,
    open_code: category::HANDSHAKE,
    checksum: ChecksumPolicy::SumPlusTwo,
    command_seconds: true,
    end_has_retain: true,
};

impl ProtocolDescriptor {
    /// Exact frame size for a packet category, `None` if the revision has no
    /// such packet.
    pub fn frame_len(&self, category: PacketCategory) -> Option<usize> {
        match category {
            PacketCategory::Info => Some(self.info_len),
            PacketCategory::Timing => self.timing_len,
            PacketCategory::Result => Some(self.result_len),
            PacketCategory::End => Some(self.end_len),
        }
    }

    /// Category byte for a packet category.
    pub fn category_code(&self, category: PacketCategory) -> u8 {
        match category {
            PacketCategory::Info => category::INFO,
            PacketCategory::Timing => category::TIMING,
            PacketCategory::Result => category::RESULT,
            PacketCategory::End => self.end_code,
        }
    }

    /// Packet category implied by a category byte.
    pub fn category_for_code(&self, code: u8) -> Option<PacketCategory> {
        match code {
            category::INFO => Some(PacketCategory::Info),
            category::TIMING if self.timing_len.is_some() => Some(PacketCategory::Timing),
            category::RESULT => Some(PacketCategory::Result),
            c if c == self.end_code => Some(PacketCategory::End),
            _ => None,
        }
    }

    /// Length of the serial / rolling code in the info packet.
    pub fn code_len(&self) -> usize {
        self.info_len - ENVELOPE_SIZE - INFO_FIXED_FIELDS - self.checksum.width()
    }

    /// Exact size of every host command.
    pub fn command_len(&self) -> usize {
        let timestamp = if self.command_seconds { 6 } else { 5 };
        ENVELOPE_SIZE + timestamp + self.checksum.width()
    }

    /// Category byte for a host command, `None` if the revision lacks it.
    pub fn command_code(&self, kind: CommandKind) -> Option<u8> {
        match kind {
            CommandKind::InfoRequest => Some(self.open_code),
            CommandKind::DataRequest => Some(category::RESULT),
            CommandKind::TimeSync => self.timing_len.map(|_| category::TIMING),
        }
    }

    /// Host command implied by a category byte.
    pub fn command_for_code(&self, code: u8) -> Option<CommandKind> {
        match code {
            c if c == self.open_code => Some(CommandKind::InfoRequest),
            category::RESULT => Some(CommandKind::DataRequest),
            category::TIMING if self.timing_len.is_some() => Some(CommandKind::TimeSync),
            _ => None,
        }
    }
}
