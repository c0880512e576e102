//! Communication session: one host-driven exchange with a meter.
//!
//! ```text
//! host                          meter
//!  │ ── info request ─────────► │
//!  │ ◄──────────────── info ─── │
//!  │ ── data request ─────────► │
//!  │ ◄────────────── result ─── │   repeated per stored reading
//!  │ ── data request ─────────► │
//!  │ ◄───────────────── end ─── │
//! ```
//!
//! [`BlockingSession`] runs the exchange on the calling thread against a
//! [`BlockingTransport`](crate::transport::BlockingTransport).
//! [`AsyncSession`] is fed frames by the transport and keeps its deadlines
//! on tokio. Both share the same state machine, so they produce identical
//! [`Communication`]s for identical input.

mod async_session;
mod blocking;
mod builder;
mod communication;
mod listener;
mod machine;

pub use async_session::{AsyncSession, Outcome};
pub use blocking::BlockingSession;
pub use builder::SessionBuilder;
pub use communication::Communication;
pub use listener::{NoopListener, SessionListener};
pub use machine::SessionState;
