//! Error types for glucometer-link.
//!
//! Two layers:
//! - [`ProtocolError`]: what went wrong on the wire (bad length, bad content,
//!   no reply). These end up inside a [`Communication`](crate::Communication)
//!   and are reported to the listener, never returned as `Err`.
//! - [`LinkError`]: faults outside the protocol (transport, configuration,
//!   unencodable frames).

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Fixed frame field that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameField {
    StartCode,
    Length,
    Category,
    Checksum,
}

impl fmt::Display for FrameField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameField::StartCode => "start code",
            FrameField::Length => "length byte",
            FrameField::Category => "category byte",
            FrameField::Checksum => "checksum",
        };
        f.write_str(name)
    }
}

/// A frame that could not be decoded as the expected packet.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodeError {
    /// Frame size does not match the table entry for its category.
    #[error("length error: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    /// A fixed field or the checksum does not hold the expected value.
    #[error("content error in {field}: expected {expected:#04x}, got {actual:#04x}")]
    Content {
        field: FrameField,
        expected: u32,
        actual: u32,
    },
}

/// Coarse classification handed to `on_protocol_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Length,
    Content,
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Length => f.write_str("LengthError"),
            ErrorKind::Content => f.write_str("ContentError"),
            ErrorKind::Timeout => f.write_str("TimeoutError"),
        }
    }
}

/// Terminal failure of a communication session.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The device stopped answering.
    #[error("timeout error: no valid reply after {retries_exhausted} attempts")]
    Timeout { retries_exhausted: u32 },
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Decode(DecodeError::Length { .. }) => ErrorKind::Length,
            ProtocolError::Decode(DecodeError::Content { .. }) => ErrorKind::Content,
            ProtocolError::Timeout { .. } => ErrorKind::Timeout,
        }
    }
}

/// Main error type for operations outside the wire protocol.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error from a transport implementation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport-level failure reported by the BLE layer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Link closed while a frame was being sent or awaited.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame cannot be represented in the version's wire format.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
