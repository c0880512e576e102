//! Synchronous driver.
//!
//! Runs the exchange on the caller's thread. The retry deadline becomes the
//! receive timeout: a receive that lapses counts as one expired deadline.

use std::sync::Arc;
use std::time::Duration;

use super::listener::SessionListener;
use super::machine::{Action, SessionCore, SessionState};
use super::Communication;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::transport::BlockingTransport;

/// Session driven by [`BlockingSession::communicate`].
pub struct BlockingSession {
    core: SessionCore,
    listener: Arc<dyn SessionListener>,
    wait: Duration,
}

impl BlockingSession {
    pub(crate) fn new(
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        listener: Arc<dyn SessionListener>,
    ) -> Self {
        Self {
            core: SessionCore::new(config, clock),
            listener,
            wait: Duration::ZERO,
        }
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    pub fn config(&self) -> &SessionConfig {
        self.core.config()
    }

    /// Snapshot of what has been collected so far.
    pub fn communication(&self) -> Communication {
        self.core.communication().clone()
    }

    /// Run one full exchange and return its terminal aggregate.
    ///
    /// Protocol failures are reported inside the returned [`Communication`].
    /// `Err` is reserved for the transport itself failing, in which case the
    /// session is disconnected.
    pub fn communicate<T>(&mut self, transport: &mut T) -> Result<Communication>
    where
        T: BlockingTransport + ?Sized,
    {
        let actions = self.core.connect();
        if let Err(err) = self.apply(actions, transport) {
            return Err(self.abort(err));
        }

        loop {
            if self.core.state().is_terminal() {
                return Ok(self.core.communication().clone());
            }

            let actions = match transport.receive_frame(self.wait) {
                Ok(Some(frame)) => self.core.on_frame(&frame),
                Ok(None) => self.core.on_deadline(),
                Err(err) => return Err(self.abort(err)),
            };
            if let Err(err) = self.apply(actions, transport) {
                return Err(self.abort(err));
            }
        }
    }

    /// Drop the exchange. Idempotent.
    pub fn disconnect(&mut self) {
        self.core.disconnect();
        self.wait = Duration::ZERO;
    }

    fn apply<T>(&mut self, actions: Vec<Action>, transport: &mut T) -> Result<()>
    where
        T: BlockingTransport + ?Sized,
    {
        for action in actions {
            match action {
                Action::Send(frame) => transport.send_frame(frame)?,
                Action::Arm(after) => self.wait = after,
                Action::Cancel => self.wait = Duration::ZERO,
                Action::Notify(notification) => notification.deliver(self.listener.as_ref()),
            }
        }
        Ok(())
    }

    fn abort(&mut self, err: LinkError) -> LinkError {
        tracing::error!("Transport failed, disconnecting: {}", err);
        self.disconnect();
        err
    }
}

impl std::fmt::Debug for BlockingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingSession")
            .field("state", &self.core.state())
            .field("version", &self.core.config().version)
            .field("attempts", &self.core.attempts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{ErrorKind, ProtocolError};
    use crate::protocol::{ProtocolVersion, Timestamp};
    use crate::session::NoopListener;
    use crate::transport::SimulatedMeter;
    use bytes::Bytes;

    fn session(version: ProtocolVersion) -> BlockingSession {
        BlockingSession::new(
            SessionConfig::new(version),
            Arc::new(FixedClock(Timestamp::new(2024, 6, 18, 9, 30).with_second(0))),
            Arc::new(NoopListener),
        )
    }

    #[test]
    fn test_full_exchange() {
        let mut meter = SimulatedMeter::sample(ProtocolVersion::V2, 4);
        let mut session = session(ProtocolVersion::V2);

        let comm = session.communicate(&mut meter).unwrap();
        assert!(comm.is_valid());
        assert_eq!(comm.measurements().unwrap().len(), 4);
        assert_eq!(session.state(), SessionState::Done);
        // info + 4 results + end
        assert_eq!(meter.commands().len(), 6);
    }

    #[test]
    fn test_lost_replies_are_resent() {
        let mut meter = SimulatedMeter::sample(ProtocolVersion::V3_2, 2);
        meter.drop_next(3);
        let mut session = session(ProtocolVersion::V3_2);

        let comm = session.communicate(&mut meter).unwrap();
        assert!(comm.is_valid());
        assert_eq!(meter.commands().len(), 4 + 3);
    }

    #[test]
    fn test_silent_meter_times_out() {
        let mut meter = SimulatedMeter::sample(ProtocolVersion::V1, 2);
        meter.go_silent();
        let mut session = session(ProtocolVersion::V1);

        let comm = session.communicate(&mut meter).unwrap();
        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(comm.error().map(ProtocolError::kind), Some(ErrorKind::Timeout));
        assert_eq!(meter.commands().len(), 5);
    }

    /// Meter that records the wait handed to every receive.
    struct TimedLink {
        meter: SimulatedMeter,
        waits: Vec<Duration>,
    }

    impl BlockingTransport for TimedLink {
        fn send_frame(&mut self, frame: Bytes) -> Result<()> {
            self.meter.send_frame(frame)
        }

        fn receive_frame(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
            self.waits.push(timeout);
            self.meter.receive_frame(timeout)
        }
    }

    #[test]
    fn test_receive_waits_follow_deadlines() {
        let mut link = TimedLink {
            meter: SimulatedMeter::sample(ProtocolVersion::V1, 2),
            waits: Vec::new(),
        };
        let mut session = session(ProtocolVersion::V1);
        session.communicate(&mut link).unwrap();

        let ms = |n| Duration::from_millis(n);
        // info, two results, end
        assert_eq!(link.waits, vec![ms(1000), ms(300), ms(300), ms(300)]);
    }

    #[test]
    fn test_resend_waits_retry_interval() {
        let mut meter = SimulatedMeter::sample(ProtocolVersion::V1, 0);
        meter.drop_next(1);
        let mut link = TimedLink {
            meter,
            waits: Vec::new(),
        };
        let mut session = session(ProtocolVersion::V1);
        session.communicate(&mut link).unwrap();

        let ms = |n| Duration::from_millis(n);
        // lapsed info request, resent info request, end
        assert_eq!(link.waits, vec![ms(1000), ms(300), ms(300)]);
    }

    struct BrokenLink;

    impl BlockingTransport for BrokenLink {
        fn send_frame(&mut self, _frame: Bytes) -> Result<()> {
            Err(LinkError::ConnectionClosed)
        }

        fn receive_frame(&mut self, _timeout: Duration) -> Result<Option<Bytes>> {
            Ok(None)
        }
    }

    #[test]
    fn test_transport_error_disconnects() {
        let mut session = session(ProtocolVersion::V2);
        let err = session.communicate(&mut BrokenLink).unwrap_err();
        assert!(matches!(err, LinkError::ConnectionClosed));
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
