//! Frame codec parametrized by a [`ProtocolDescriptor`].
//!
//! Body layouts after the three-byte envelope:
//! ```text
//! Info    │ protocol │ client │ model │ type │ battery │ code (5/6/9) │
//! Result  │ yy │ mm │ dd │ hh │ mi │ glucose u16 LE │ retain │
//! End     │ retain (V2+) │
//! Timing  │ code u16 LE │                         (V3.1 only)
//! Command │ yy │ mm │ dd │ hh │ mi │ ss (V1, V3.2) │
//! ```
//! followed by the revision's checksum.
//!
//! # Example
//!
//! ```
//! use glucometer_link::protocol::{FrameCodec, Packet, PacketCategory, ProtocolVersion};
//!
//! let codec = FrameCodec::new(ProtocolVersion::V1);
//! let end = [0x55, 0x06, 0x04, 0x5F, 0x00, 0x00];
//! let packet = codec.decode(&end, PacketCategory::End).unwrap();
//! assert!(matches!(packet, Packet::End(_)));
//! ```

use bytes::Bytes;

use super::checksum::ChecksumPolicy;
use super::packet::{
    Command, DeviceInfoRecord, EndMarker, MeasurementRecord, Packet, Timestamp, TimingRecord,
};
use super::version::{
    category, CommandKind, PacketCategory, ProtocolDescriptor, ProtocolVersion, DEVICE_START_CODE,
    ENVELOPE_SIZE, HOST_START_CODE, INFO_FIXED_FIELDS,
};
use crate::error::{DecodeError, FrameField, LinkError, Result};

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Stateless encoder/decoder for one framing revision.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    descriptor: &'static ProtocolDescriptor,
}

impl FrameCodec {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            descriptor: version.descriptor(),
        }
    }

    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.descriptor.version
    }

    #[inline]
    pub fn descriptor(&self) -> &'static ProtocolDescriptor {
        self.descriptor
    }

    #[inline]
    fn checksum(&self) -> ChecksumPolicy {
        self.descriptor.checksum
    }

    /// Decode a device frame as `expected`.
    ///
    /// Checks, in order:
    /// 1. frame size against the table entry for the category named by the
    ///    third byte (the expected category's entry when that byte is
    ///    unknown) → `Length`
    /// 2. start code, length byte, category byte → `Content`
    /// 3. checksum → `Content`
    ///
    /// Asking for a category the revision does not carry (timing outside
    /// V3.1) still runs the length check when the third byte names a known
    /// category, then fails with `Content` on the category byte.
    pub fn decode(&self, frame: &[u8], expected: PacketCategory) -> DecodeResult<Packet> {
        match expected {
            PacketCategory::Info => self.decode_info(frame).map(Packet::Info),
            PacketCategory::Timing => self.decode_timing(frame).map(Packet::Timing),
            PacketCategory::Result => self.decode_result(frame).map(Packet::Result),
            PacketCategory::End => self.decode_end(frame).map(Packet::End),
        }
    }

    pub fn decode_info(&self, frame: &[u8]) -> DecodeResult<DeviceInfoRecord> {
        let body = self.validate(frame, PacketCategory::Info)?;
        Ok(DeviceInfoRecord {
            protocol_code: body[0],
            client_code: body[1],
            model_code: body[2],
            type_code: body[3],
            battery_percent: body[4],
            code: body[INFO_FIXED_FIELDS..].to_vec(),
        })
    }

    pub fn decode_result(&self, frame: &[u8]) -> DecodeResult<MeasurementRecord> {
        let body = self.validate(frame, PacketCategory::Result)?;
        Ok(MeasurementRecord {
            timestamp: Timestamp::from_wire(&body[..5], None),
            glucose_raw: u16::from_le_bytes([body[5], body[6]]),
            retain: body[7],
        })
    }

    pub fn decode_end(&self, frame: &[u8]) -> DecodeResult<EndMarker> {
        let body = self.validate(frame, PacketCategory::End)?;
        Ok(EndMarker {
            retain: if self.descriptor.end_has_retain {
                Some(body[0])
            } else {
                None
            },
        })
    }

    pub fn decode_timing(&self, frame: &[u8]) -> DecodeResult<TimingRecord> {
        let body = self.validate(frame, PacketCategory::Timing)?;
        Ok(TimingRecord {
            code: u16::from_le_bytes([body[0], body[1]]),
        })
    }

    /// Run the length, envelope and checksum checks; returns the body.
    fn validate<'a>(&self, frame: &'a [u8], expected: PacketCategory) -> DecodeResult<&'a [u8]> {
        let d = self.descriptor;
        let expected_code = d.category_code(expected);
        let expected_len = d.frame_len(expected);

        let implied_len = frame
            .get(2)
            .and_then(|&code| d.category_for_code(code))
            .and_then(|category| d.frame_len(category))
            .or(expected_len);
        if let Some(len) = implied_len {
            if frame.len() != len {
                return Err(DecodeError::Length {
                    expected: len,
                    actual: frame.len(),
                });
            }
        }

        // Only reachable when `expected` is not part of this revision.
        if expected_len.is_none() {
            return Err(DecodeError::Content {
                field: FrameField::Category,
                expected: u32::from(expected_code),
                actual: frame.get(2).copied().map_or(0, u32::from),
            });
        }

        check_envelope(frame, DEVICE_START_CODE, expected_code)?;
        self.checksum().verify(frame)?;

        Ok(&frame[ENVELOPE_SIZE..frame.len() - self.checksum().width()])
    }

    /// Decode a device frame of whatever category its third byte names.
    pub fn decode_any(&self, frame: &[u8]) -> DecodeResult<Packet> {
        let code = frame.get(2).copied().ok_or(DecodeError::Length {
            expected: ENVELOPE_SIZE,
            actual: frame.len(),
        })?;
        let packet_category = self
            .descriptor
            .category_for_code(code)
            .ok_or(DecodeError::Content {
                field: FrameField::Category,
                expected: u32::from(category::RESULT),
                actual: u32::from(code),
            })?;
        self.decode(frame, packet_category)
    }

    /// Build a host command stamped with `timestamp`.
    pub fn encode_command(&self, kind: CommandKind, timestamp: &Timestamp) -> Result<Bytes> {
        let d = self.descriptor;
        let code = d.command_code(kind).ok_or_else(|| {
            LinkError::Encode(format!("{:?} is not part of protocol {}", kind, d.version))
        })?;

        let mut frame = Vec::with_capacity(d.command_len());
        frame.extend_from_slice(&[HOST_START_CODE, d.command_len() as u8, code]);
        frame.extend_from_slice(&[
            timestamp.year_offset()?,
            timestamp.month,
            timestamp.day,
            timestamp.hour,
            timestamp.minute,
        ]);
        if d.command_seconds {
            frame.push(timestamp.second.unwrap_or(0));
        }
        self.checksum().append(&mut frame)?;

        debug_assert_eq!(frame.len(), d.command_len());
        Ok(Bytes::from(frame))
    }

    /// Decode a host command, as the meter does.
    pub fn decode_command(&self, frame: &[u8]) -> DecodeResult<Command> {
        let d = self.descriptor;
        if frame.len() != d.command_len() {
            return Err(DecodeError::Length {
                expected: d.command_len(),
                actual: frame.len(),
            });
        }
        if frame[0] != HOST_START_CODE {
            return Err(DecodeError::Content {
                field: FrameField::StartCode,
                expected: u32::from(HOST_START_CODE),
                actual: u32::from(frame[0]),
            });
        }
        if usize::from(frame[1]) != frame.len() {
            return Err(DecodeError::Content {
                field: FrameField::Length,
                expected: frame.len() as u32,
                actual: u32::from(frame[1]),
            });
        }
        let kind = d.command_for_code(frame[2]).ok_or(DecodeError::Content {
            field: FrameField::Category,
            expected: u32::from(d.open_code),
            actual: u32::from(frame[2]),
        })?;
        self.checksum().verify(frame)?;

        let fields = &frame[ENVELOPE_SIZE..];
        let second = if d.command_seconds {
            Some(fields[5])
        } else {
            None
        };
        Ok(Command {
            kind,
            timestamp: Timestamp::from_wire(&fields[..5], second),
        })
    }

    /// Build a device frame, as the meter does.
    pub fn encode_packet(&self, packet: &Packet) -> Result<Bytes> {
        let d = self.descriptor;
        let category = packet.category();
        let len = d.frame_len(category).ok_or_else(|| {
            LinkError::Encode(format!(
                "{:?} packet is not part of protocol {}",
                category, d.version
            ))
        })?;

        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&[DEVICE_START_CODE, len as u8, d.category_code(category)]);
        match packet {
            Packet::Info(info) => {
                if info.code.len() != d.code_len() {
                    return Err(LinkError::Encode(format!(
                        "device code is {} bytes, protocol {} carries {}",
                        info.code.len(),
                        d.version,
                        d.code_len()
                    )));
                }
                frame.extend_from_slice(&[
                    info.protocol_code,
                    info.client_code,
                    info.model_code,
                    info.type_code,
                    info.battery_percent,
                ]);
                frame.extend_from_slice(&info.code);
            }
            Packet::Result(record) => {
                let ts = &record.timestamp;
                frame.extend_from_slice(&[ts.year_offset()?, ts.month, ts.day, ts.hour, ts.minute]);
                frame.extend_from_slice(&record.glucose_raw.to_le_bytes());
                frame.push(record.retain);
            }
            Packet::End(end) => {
                if d.end_has_retain {
                    frame.push(end.retain.unwrap_or(0));
                }
            }
            Packet::Timing(timing) => frame.extend_from_slice(&timing.code.to_le_bytes()),
        }
        self.checksum().append(&mut frame)?;

        debug_assert_eq!(frame.len(), len);
        Ok(Bytes::from(frame))
    }
}

fn check_envelope(frame: &[u8], start_code: u8, category_code: u8) -> DecodeResult<()> {
    if frame[0] != start_code {
        return Err(DecodeError::Content {
            field: FrameField::StartCode,
            expected: u32::from(start_code),
            actual: u32::from(frame[0]),
        });
    }
    if usize::from(frame[1]) != frame.len() {
        return Err(DecodeError::Content {
            field: FrameField::Length,
            expected: frame.len() as u32,
            actual: u32::from(frame[1]),
        });
    }
    if frame[2] != category_code {
        return Err(DecodeError::Content {
            field: FrameField::Category,
            expected: u32::from(category_code),
            actual: u32::from(frame[2]),
        });
    }
    Ok(())
}
