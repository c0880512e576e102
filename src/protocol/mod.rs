//! Protocol module - framing revisions, checksums, and the frame codec.
//!
//! This module implements the meter's binary protocol:
//! - Per-revision descriptors (frame sizes, category codes, checksum rule)
//! - Checksum policies for V1 and V2/V3.x
//! - Typed packets and the stateless [`FrameCodec`]

mod checksum;
mod codec;
mod packet;
mod version;

pub use checksum::{byte_sum, ChecksumPolicy, RUNNING_SUM_CAPACITY};
pub use codec::FrameCodec;
pub use packet::{
    Command, DeviceInfoRecord, EndMarker, MeasurementRecord, Packet, Timestamp, TimingRecord,
    YEAR_BASE,
};
pub use version::{
    category, CommandKind, PacketCategory, ProtocolDescriptor, ProtocolVersion,
    DEVICE_START_CODE, ENVELOPE_SIZE, HOST_START_CODE, INFO_FIXED_FIELDS,
};
