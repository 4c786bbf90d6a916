//! Output event records.
//!
//! The event log is the sole externally visible artifact of the collector:
//! one CSV line per event, consumed downstream by the latency analysis.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::models::ContentId;

/// ISO-8601 UTC with microsecond precision, as downstream analysis expects.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Classification carried by an output event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// First observation of an identifier. Renders as `0`.
    Discovered,
    /// HTTP status observed for a verification attempt.
    Http(u16),
    /// The feed answered but the identifier was not in it. Kept as its own
    /// variant rather than a fake HTTP number so it cannot collide with a
    /// genuine provider status.
    AbsentFromFeed,
    /// Transport failure or undecodable response; no status code available.
    Unreachable,
    /// The probe gave up past its backoff ceiling.
    Abandoned,
}

impl EventStatus {
    /// Whether this attempt found the item.
    pub fn is_found(&self) -> bool {
        matches!(self, EventStatus::Http(200))
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Discovered => f.write_str("0"),
            EventStatus::Http(code) => write!(f, "{code}"),
            EventStatus::AbsentFromFeed => f.write_str("absent"),
            EventStatus::Unreachable => f.write_str("error"),
            EventStatus::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// One record of the append-only output log.
#[derive(Debug, Clone)]
pub struct OutputEvent {
    pub timestamp: DateTime<Utc>,
    /// Endpoint name, or `STDIN` for stdin ingestion
    pub source: String,
    pub id: ContentId,
    pub status: EventStatus,
}

impl OutputEvent {
    /// Create an event stamped with the current instant.
    pub fn new(source: impl Into<String>, id: ContentId, status: EventStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            id,
            status,
        }
    }

    /// Render as one CSV record (no trailing newline).
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.source,
            self.id,
            self.status
        )
    }
}
