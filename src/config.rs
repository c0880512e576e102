//! Session configuration.
//!
//! Can be built in code or loaded from JSON:
//!
//! ```
//! use glucometer_link::{ProtocolVersion, SessionConfig};
//!
//! let config = SessionConfig::from_json(r#"{ "version": "v3.1", "retry_interval_ms": 250 }"#).unwrap();
//! assert_eq!(config.version, ProtocolVersion::V3_1);
//! assert_eq!(config.retry_interval.as_millis(), 250);
//! assert_eq!(config.max_retries, 5);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{LinkError, Result};
use crate::protocol::ProtocolVersion;

/// Maximum sends of one request before the session times out.
pub const MAX_RETRIES: u32 = 5;

/// Resend interval while waiting for a reply.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// First deadline of the legacy (V1) info-polling path.
pub const LEGACY_INITIAL_DEADLINE: Duration = Duration::from_millis(1000);

/// Timing and retry settings for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub version: ProtocolVersion,
    /// Deadline after the opening request.
    pub initial_deadline: Duration,
    /// Deadline after every later send, and between resends.
    pub retry_interval: Duration,
    /// Sends per request, the first one included.
    pub max_retries: u32,
}

impl SessionConfig {
    /// Defaults for a revision: 300 ms cadence, with the legacy 1000 ms
    /// first deadline for V1.
    pub fn new(version: ProtocolVersion) -> Self {
        let initial_deadline = match version {
            ProtocolVersion::V1 => LEGACY_INITIAL_DEADLINE,
            _ => DEFAULT_RETRY_INTERVAL,
        };
        Self {
            version,
            initial_deadline,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_retries: MAX_RETRIES,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        let mut config = Self::new(raw.version);
        if let Some(ms) = raw.initial_deadline_ms {
            config.initial_deadline = Duration::from_millis(ms);
        }
        if let Some(ms) = raw.retry_interval_ms {
            config.retry_interval = Duration::from_millis(ms);
        }
        if let Some(n) = raw.max_retries {
            config.max_retries = n;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(LinkError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.initial_deadline.is_zero() || self.retry_interval.is_zero() {
            return Err(LinkError::InvalidConfig(
                "deadlines must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(ProtocolVersion::V2)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    version: ProtocolVersion,
    initial_deadline_ms: Option<u64>,
    retry_interval_ms: Option<u64>,
    max_retries: Option<u32>,
}
