//! # glucometer-link
//!
//! Host side of the binary protocol spoken by handheld glucose meters over
//! a serial or Bluetooth link.
//!
//! Four framing revisions are supported: V1, V2, V3.1 and V3.2. They differ
//! in frame sizes, category codes and checksum rule, all captured in one
//! [`ProtocolDescriptor`](protocol::ProtocolDescriptor) per revision.
//!
//! ## Architecture
//!
//! - **Codec** ([`protocol`]): stateless frame validation, decoding and
//!   command encoding
//! - **Session** ([`session`]): the info → results → end exchange, with
//!   per-request retries and a terminal [`Communication`] aggregate
//! - **Transport** ([`transport`]): seams to the byte link, plus an
//!   in-memory [`SimulatedMeter`](transport::SimulatedMeter)
//!
//! ## Example
//!
//! ```
//! use glucometer_link::transport::SimulatedMeter;
//! use glucometer_link::{ProtocolVersion, SessionBuilder};
//!
//! let mut meter = SimulatedMeter::sample(ProtocolVersion::V2, 3);
//! let mut session = SessionBuilder::new(ProtocolVersion::V2)
//!     .build_blocking()
//!     .unwrap();
//!
//! let communication = session.communicate(&mut meter).unwrap();
//! assert!(communication.is_valid());
//! assert_eq!(communication.measurements().unwrap().len(), 3);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SessionConfig;
pub use error::{DecodeError, ErrorKind, FrameField, LinkError, ProtocolError, Result};
pub use protocol::{FrameCodec, ProtocolVersion};
pub use session::{
    AsyncSession, BlockingSession, Communication, NoopListener, Outcome, SessionBuilder,
    SessionListener, SessionState,
};
