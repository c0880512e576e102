//! In-memory meter that answers host commands.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::BlockingTransport;
use crate::error::Result;
use crate::protocol::{
    Command, CommandKind, DeviceInfoRecord, EndMarker, FrameCodec, MeasurementRecord, Packet,
    ProtocolVersion, Timestamp, TimingRecord,
};

/// Plays the device side of an exchange.
///
/// Replies follow the device flow: info for an info request, then the
/// timing packet once (V3.1, if configured), then one stored record per data
/// request, then the end marker. A dropped reply does not consume a record,
/// so the host's resend gets the same answer.
#[derive(Debug)]
pub struct SimulatedMeter {
    codec: FrameCodec,
    info: DeviceInfoRecord,
    records: Vec<MeasurementRecord>,
    cursor: usize,
    end: EndMarker,
    timing: Option<TimingRecord>,
    timing_sent: bool,
    drop_replies: u32,
    corrupt_replies: u32,
    commands: Vec<Command>,
    inbox: VecDeque<Bytes>,
}

impl SimulatedMeter {
    pub fn new(version: ProtocolVersion, info: DeviceInfoRecord) -> Self {
        let codec = FrameCodec::new(version);
        let end = EndMarker {
            retain: codec.descriptor().end_has_retain.then_some(0),
        };
        Self {
            codec,
            info,
            records: Vec::new(),
            cursor: 0,
            end,
            timing: None,
            timing_sent: false,
            drop_replies: 0,
            corrupt_replies: 0,
            commands: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    /// Meter holding `count` readings one minute apart.
    pub fn sample(version: ProtocolVersion, count: usize) -> Self {
        let info = DeviceInfoRecord {
            protocol_code: 0x01,
            client_code: 0x02,
            model_code: 0x03,
            type_code: 0x04,
            battery_percent: 80,
            code: (1..=version.descriptor().code_len() as u8).collect(),
        };
        let records = (0..count)
            .map(|i| MeasurementRecord {
                timestamp: Timestamp::new(2024, 3, 15, 8 + (i / 60) as u8, (i % 60) as u8),
                glucose_raw: 90 + (i as u16) * 7,
                retain: (i % 2) as u8,
            })
            .collect();
        Self::new(version, info).with_records(records)
    }

    pub fn with_records(mut self, records: Vec<MeasurementRecord>) -> Self {
        self.records = records;
        self
    }

    pub fn with_end(mut self, end: EndMarker) -> Self {
        self.end = end;
        self
    }

    /// Send a timing packet before the first record.
    pub fn with_timing(mut self, timing: TimingRecord) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Swallow the next `count` replies.
    pub fn drop_next(&mut self, count: u32) {
        self.drop_replies = count;
    }

    /// Never answer again.
    pub fn go_silent(&mut self) {
        self.drop_replies = u32::MAX;
    }

    /// Damage the checksum of the next `count` replies.
    pub fn corrupt_next(&mut self, count: u32) {
        self.corrupt_replies = count;
    }

    pub fn version(&self) -> ProtocolVersion {
        self.codec.version()
    }

    /// Every well-formed command received so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Decode one host command and build the reply, if any.
    pub fn handle_command(&mut self, frame: &[u8]) -> Option<Bytes> {
        let command = match self.codec.decode_command(frame) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!("Meter rejected command: {}", err);
                return None;
            }
        };
        self.commands.push(command);

        if command.kind == CommandKind::InfoRequest {
            self.cursor = 0;
            self.timing_sent = false;
        }

        if self.drop_replies > 0 {
            self.drop_replies -= 1;
            tracing::debug!(kind = ?command.kind, "Meter dropping reply");
            return None;
        }

        let packet = self.next_packet(command.kind);
        let mut reply = match self.codec.encode_packet(&packet) {
            Ok(frame) => frame.to_vec(),
            Err(err) => {
                tracing::warn!("Meter cannot encode reply: {}", err);
                return None;
            }
        };

        if self.corrupt_replies > 0 {
            self.corrupt_replies -= 1;
            if let Some(last) = reply.last_mut() {
                *last ^= 0xFF;
            }
        }
        Some(Bytes::from(reply))
    }

    fn next_packet(&mut self, kind: CommandKind) -> Packet {
        if kind == CommandKind::InfoRequest {
            return Packet::Info(self.info.clone());
        }
        if let Some(timing) = self.timing.filter(|_| !self.timing_sent) {
            self.timing_sent = true;
            return Packet::Timing(timing);
        }
        match self.records.get(self.cursor) {
            Some(record) => {
                self.cursor += 1;
                Packet::Result(record.clone())
            }
            None => Packet::End(self.end),
        }
    }
}

impl BlockingTransport for SimulatedMeter {
    fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        if let Some(reply) = self.handle_command(&frame) {
            self.inbox.push_back(reply);
        }
        Ok(())
    }

    /// Replies are queued synchronously, so an empty inbox lapses at once.
    fn receive_frame(&mut self, _timeout: Duration) -> Result<Option<Bytes>> {
        Ok(self.inbox.pop_front())
    }
}
