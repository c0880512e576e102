//! Aggregate result of one exchange.

use serde::Serialize;

use crate::error::ProtocolError;
use crate::protocol::{DeviceInfoRecord, EndMarker, MeasurementRecord, TimingRecord};

/// Everything a session collected from the meter.
///
/// Becomes terminal exactly once, when the end marker or an error is set.
/// After that every mutator is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Communication {
    info: Option<DeviceInfoRecord>,
    /// `None` until the first result arrives; device order is preserved.
    measurements: Option<Vec<MeasurementRecord>>,
    end: Option<EndMarker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timing: Option<TimingRecord>,
    error: Option<ProtocolError>,
}

impl Communication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Info, measurements and end marker present, no error.
    pub fn is_valid(&self) -> bool {
        self.info.is_some()
            && self.measurements.is_some()
            && self.end.is_some()
            && self.error.is_none()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.end.is_some() || self.error.is_some()
    }

    pub fn info(&self) -> Option<&DeviceInfoRecord> {
        self.info.as_ref()
    }

    pub fn measurements(&self) -> Option<&[MeasurementRecord]> {
        self.measurements.as_deref()
    }

    pub fn end(&self) -> Option<&EndMarker> {
        self.end.as_ref()
    }

    pub fn timing(&self) -> Option<&TimingRecord> {
        self.timing.as_ref()
    }

    pub fn error(&self) -> Option<&ProtocolError> {
        self.error.as_ref()
    }

    /// Serialize for hand-off to the consumer.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub(crate) fn set_info(&mut self, info: DeviceInfoRecord) {
        if self.guard("info") {
            self.info = Some(info);
        }
    }

    pub(crate) fn set_timing(&mut self, timing: TimingRecord) {
        if self.guard("timing") {
            self.timing = Some(timing);
        }
    }

    pub(crate) fn push_measurement(&mut self, record: MeasurementRecord) {
        if self.guard("measurement") {
            self.measurements.get_or_insert_with(Vec::new).push(record);
        }
    }

    /// Terminal success. Measurements stay `None` if no result arrived.
    pub(crate) fn finish(&mut self, end: EndMarker) {
        if self.guard("end marker") {
            self.end = Some(end);
        }
    }

    /// Terminal failure.
    pub(crate) fn fail(&mut self, error: ProtocolError) {
        if self.guard("error") {
            self.error = Some(error);
        }
    }

    fn guard(&self, what: &str) -> bool {
        if self.is_terminal() {
            tracing::warn!("Dropping {} for a finished communication", what);
            return false;
        }
        true
    }
}
