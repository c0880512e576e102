//! Consumer-facing callbacks.

use crate::error::{ErrorKind, ProtocolError};
use crate::protocol::{DeviceInfoRecord, MeasurementRecord};

use super::Communication;

/// Receives session results. Every method defaults to a no-op.
///
/// Callbacks run outside the session lock, but they must not block: the
/// asynchronous driver calls them from the frame-delivery or timer context.
pub trait SessionListener: Send + Sync {
    fn on_device_info(&self, _info: &DeviceInfoRecord) {}

    /// All records of a completed exchange, in device order.
    fn on_measurements(&self, _records: &[MeasurementRecord]) {}

    fn on_protocol_error(&self, _kind: ErrorKind, _message: &str) {}

    /// Terminal aggregate, success or failure.
    fn on_finished(&self, _communication: &Communication) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SessionListener for NoopListener {}

/// Event produced by a state transition, delivered after the lock is
/// released.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    DeviceInfo(DeviceInfoRecord),
    Measurements(Vec<MeasurementRecord>),
    Error(ProtocolError),
    Finished(Communication),
}

impl Notification {
    pub(crate) fn deliver(&self, listener: &dyn SessionListener) {
        match self {
            Notification::DeviceInfo(info) => listener.on_device_info(info),
            Notification::Measurements(records) => listener.on_measurements(records),
            Notification::Error(err) => listener.on_protocol_error(err.kind(), &err.to_string()),
            Notification::Finished(communication) => listener.on_finished(communication),
        }
    }
}
