//! Exchange state machine shared by both drivers.
//!
//! The core never performs I/O. Each event returns the [`Action`]s the driver
//! must carry out, in order:
//!
//! ```text
//!  Disconnected ──connect──► AwaitingInfo ──info──► AwaitingResultOrEnd ─┐
//!        ▲                        │                   │    ▲   result /  │
//!        │                        │                   │    └── timing ───┘
//!    disconnect            bad frame / timeout       end        bad frame / timeout
//!        │                        ▼                   ▼                  │
//!        └──────────────────── Error ◄─────────── Done ◄─────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use super::listener::Notification;
use super::Communication;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{DecodeError, ProtocolError};
use crate::protocol::{CommandKind, EndMarker, FrameCodec, MeasurementRecord, TimingRecord};

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    AwaitingInfo,
    AwaitingResultOrEnd,
    Done,
    Error,
}

impl SessionState {
    /// A request is outstanding.
    #[inline]
    pub fn is_awaiting(self) -> bool {
        matches!(
            self,
            SessionState::AwaitingInfo | SessionState::AwaitingResultOrEnd
        )
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Done | SessionState::Error)
    }
}

/// Side effect requested by the core.
#[derive(Debug, Clone)]
pub(crate) enum Action {
    Send(Bytes),
    /// Replace any pending deadline with one `Duration` from now.
    Arm(Duration),
    Cancel,
    Notify(Notification),
}

pub(crate) struct SessionCore {
    codec: FrameCodec,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    communication: Communication,
    last_outbound: Option<Bytes>,
    /// Sends of the outstanding request, the first one included.
    attempts: u32,
}

impl SessionCore {
    pub(crate) fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            codec: FrameCodec::new(config.version),
            config,
            clock,
            state: SessionState::Disconnected,
            communication: Communication::new(),
            last_outbound: None,
            attempts: 0,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub(crate) fn communication(&self) -> &Communication {
        &self.communication
    }

    #[inline]
    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start a fresh exchange, discarding any previous result.
    pub(crate) fn connect(&mut self) -> Vec<Action> {
        if self.state.is_awaiting() {
            tracing::warn!(state = ?self.state, "Connect ignored, exchange already running");
            return Vec::new();
        }

        tracing::debug!(version = %self.config.version, "Opening exchange");
        self.communication = Communication::new();
        self.state = SessionState::AwaitingInfo;
        self.request(CommandKind::InfoRequest, self.config.initial_deadline)
    }

    /// Feed one complete frame from the transport.
    pub(crate) fn on_frame(&mut self, frame: &[u8]) -> Vec<Action> {
        tracing::debug!(len = frame.len(), state = ?self.state, "Frame received");
        match self.state {
            SessionState::AwaitingInfo => match self.codec.decode_info(frame) {
                Ok(info) => {
                    tracing::debug!(battery = info.battery_percent, "Device info received");
                    self.communication.set_info(info.clone());
                    self.state = SessionState::AwaitingResultOrEnd;
                    let mut actions = vec![Action::Notify(Notification::DeviceInfo(info))];
                    actions.extend(self.request(CommandKind::DataRequest, self.config.retry_interval));
                    actions
                }
                Err(err) => self.fail(err.into()),
            },
            SessionState::AwaitingResultOrEnd => self.on_result_or_end(frame),
            SessionState::Disconnected | SessionState::Done | SessionState::Error => {
                tracing::warn!(state = ?self.state, "Ignoring frame, no exchange running");
                Vec::new()
            }
        }
    }

    /// The retry deadline expired without a valid reply.
    pub(crate) fn on_deadline(&mut self) -> Vec<Action> {
        if !self.state.is_awaiting() {
            return Vec::new();
        }

        if self.attempts < self.config.max_retries {
            self.attempts += 1;
            tracing::warn!(
                attempt = self.attempts,
                max = self.config.max_retries,
                "No reply, resending"
            );
            let mut actions = Vec::with_capacity(2);
            if let Some(frame) = &self.last_outbound {
                actions.push(Action::Send(frame.clone()));
            }
            actions.push(Action::Arm(self.config.retry_interval));
            actions
        } else {
            self.fail(ProtocolError::Timeout {
                retries_exhausted: self.attempts,
            })
        }
    }

    /// Drop the exchange. Idempotent.
    pub(crate) fn disconnect(&mut self) -> Vec<Action> {
        if self.state == SessionState::Disconnected {
            return Vec::new();
        }
        tracing::debug!(state = ?self.state, "Disconnecting");
        self.state = SessionState::Disconnected;
        self.communication = Communication::new();
        self.last_outbound = None;
        self.attempts = 0;
        vec![Action::Cancel]
    }

    fn on_result_or_end(&mut self, frame: &[u8]) -> Vec<Action> {
        let result_err = match self.codec.decode_result(frame) {
            Ok(record) => return self.on_result(record),
            Err(err) => err,
        };
        let end_err = match self.codec.decode_end(frame) {
            Ok(end) => return self.complete(end),
            Err(err) => err,
        };
        if self.codec.descriptor().timing_len.is_some() {
            if let Ok(timing) = self.codec.decode_timing(frame) {
                return self.on_timing(timing);
            }
        }
        let err = self.pick_error(frame, result_err, end_err);
        self.fail(err.into())
    }

    /// Report the failure of the path the category byte points at.
    fn pick_error(&self, frame: &[u8], result_err: DecodeError, end_err: DecodeError) -> DecodeError {
        match frame.get(2) {
            Some(&code) if code == self.codec.descriptor().end_code => end_err,
            _ => result_err,
        }
    }

    fn on_result(&mut self, record: MeasurementRecord) -> Vec<Action> {
        tracing::debug!(glucose = record.glucose_raw, "Result received");
        self.communication.push_measurement(record);
        self.request(CommandKind::DataRequest, self.config.retry_interval)
    }

    fn on_timing(&mut self, timing: TimingRecord) -> Vec<Action> {
        tracing::debug!(code = timing.code, "Timing packet received");
        self.communication.set_timing(timing);
        self.request(CommandKind::TimeSync, self.config.retry_interval)
    }

    fn complete(&mut self, end: EndMarker) -> Vec<Action> {
        self.communication.finish(end);
        self.state = SessionState::Done;
        self.last_outbound = None;

        let records = self
            .communication
            .measurements()
            .map(<[MeasurementRecord]>::to_vec)
            .unwrap_or_default();
        tracing::info!(records = records.len(), "Exchange complete");

        vec![
            Action::Cancel,
            Action::Notify(Notification::Measurements(records)),
            Action::Notify(Notification::Finished(self.communication.clone())),
        ]
    }

    fn fail(&mut self, err: ProtocolError) -> Vec<Action> {
        tracing::error!(kind = %err.kind(), "Exchange failed: {}", err);
        self.communication.fail(err.clone());
        self.state = SessionState::Error;
        self.last_outbound = None;

        vec![
            Action::Cancel,
            Action::Notify(Notification::Error(err)),
            Action::Notify(Notification::Finished(self.communication.clone())),
        ]
    }

    /// Send a new request with a fresh retry budget.
    ///
    /// A command that cannot be encoded is treated like a lost frame: the
    /// deadline is still armed and the exchange times out.
    fn request(&mut self, kind: CommandKind, deadline: Duration) -> Vec<Action> {
        let now = self.clock.now().clamped();
        self.attempts = 1;
        match self.codec.encode_command(kind, &now) {
            Ok(frame) => {
                tracing::debug!(?kind, len = frame.len(), "Sending command");
                self.last_outbound = Some(frame.clone());
                vec![Action::Send(frame), Action::Arm(deadline)]
            }
            Err(err) => {
                tracing::error!(?kind, "Cannot encode command: {}", err);
                self.last_outbound = None;
                vec![Action::Arm(deadline)]
            }
        }
    }
}
