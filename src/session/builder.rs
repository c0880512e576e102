//! Fluent construction of sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::{AsyncSession, BlockingSession, NoopListener, SessionListener};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::protocol::ProtocolVersion;
use crate::transport::FrameSink;

/// Builder for [`BlockingSession`] and [`AsyncSession`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use glucometer_link::{ProtocolVersion, SessionBuilder};
///
/// let session = SessionBuilder::new(ProtocolVersion::V3_2)
///     .retry_interval(Duration::from_millis(500))
///     .max_retries(3)
///     .build_blocking()
///     .unwrap();
/// assert_eq!(session.config().max_retries, 3);
/// ```
pub struct SessionBuilder {
    config: SessionConfig,
    listener: Arc<dyn SessionListener>,
    clock: Arc<dyn Clock>,
}

impl SessionBuilder {
    /// Defaults for `version`, the system clock and no listener.
    pub fn new(version: ProtocolVersion) -> Self {
        Self::from_config(SessionConfig::new(version))
    }

    pub fn from_config(config: SessionConfig) -> Self {
        Self {
            config,
            listener: Arc::new(NoopListener),
            clock: Arc::new(SystemClock),
        }
    }

    /// Deadline after the opening command.
    pub fn initial_deadline(mut self, deadline: Duration) -> Self {
        self.config.initial_deadline = deadline;
        self
    }

    /// Deadline after every other command, and between resends.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Sends per request before giving up.
    ///
    /// Default: 5
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: SessionListener + 'static,
    {
        self.listener = Arc::new(listener);
        self
    }

    /// Share a listener the caller keeps a handle to.
    pub fn shared_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Time source for command timestamps.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build_blocking(self) -> Result<BlockingSession> {
        self.config.validate()?;
        Ok(BlockingSession::new(self.config, self.clock, self.listener))
    }

    /// Must be called from within a tokio runtime.
    pub fn build_async<S>(self, sink: S) -> Result<AsyncSession>
    where
        S: FrameSink + 'static,
    {
        self.config.validate()?;
        let handle = Handle::try_current()
            .map_err(|err| LinkError::InvalidConfig(format!("no tokio runtime: {}", err)))?;
        Ok(AsyncSession::new(
            self.config,
            self.clock,
            self.listener,
            Arc::new(sink),
            handle,
        ))
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .finish()
    }
}
