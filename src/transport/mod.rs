//! Transport seams.
//!
//! The session never touches a byte stream. It hands complete outbound
//! frames to a transport and is fed complete inbound frames:
//!
//! - [`FrameSink`]: outbound half for the asynchronous driver. Inbound
//!   frames are pushed with `AsyncSession::on_frame_received`.
//! - [`BlockingTransport`]: both halves for the blocking driver, with a
//!   bounded wait on receive.
//!
//! Framing a raw serial or Bluetooth stream into whole frames is the
//! adapter's job.

mod simulated;

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{LinkError, Result};

pub use simulated::SimulatedMeter;

/// Accepts outbound frames. Must not block.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: Bytes) -> Result<()>;
}

impl<F> FrameSink for F
where
    F: Fn(Bytes) -> Result<()> + Send + Sync,
{
    fn send_frame(&self, frame: Bytes) -> Result<()> {
        self(frame)
    }
}

/// [`FrameSink`] that forwards into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<Bytes>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| LinkError::ConnectionClosed)
    }
}

/// Sink plus the receiver the transport task drains.
pub fn channel_sink() -> (ChannelSink, mpsc::UnboundedReceiver<Bytes>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink::new(tx), rx)
}

/// Request/response transport for the blocking driver.
pub trait BlockingTransport {
    fn send_frame(&mut self, frame: Bytes) -> Result<()>;

    /// Wait up to `timeout` for the next complete frame.
    ///
    /// `Ok(None)` means the wait lapsed.
    fn receive_frame(&mut self, timeout: Duration) -> Result<Option<Bytes>>;
}
