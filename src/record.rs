//! Raw structured log records (§3 Data Model, Record).
//!
//! A `Record` is the unit the log source adapter (C1) yields and the
//! classifier (C2) consumes. It carries no opinion about which namespaces
//! are interesting — that is C2's job.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One structured log line, as emitted by the node's tracing backend.
///
/// Ordering across records is NOT guaranteed to be monotonic in `at`; callers
/// that need ordering guarantees (the correlator) tolerate small reorderings.
#[derive(Debug, Clone, Deserialize)]
pub struct Record {
    /// UTC timestamp, sub-second precision, ISO-8601.
    pub at: DateTime<Utc>,
    /// Dotted namespace tag, e.g. `"ChainSync.Client.DownloadedHeader"`.
    pub ns: String,
    /// Nested payload; shape depends on `ns`.
    #[serde(default)]
    pub data: Value,
    /// Host identifier the record originated from.
    #[serde(default)]
    pub host: String,
}

/// A line from the underlying source that failed to parse as a `Record`.
///
/// Never fatal — the adapter counts and skips these (see `logsource`).
#[derive(Debug, thiserror::Error)]
#[error("malformed record line: {0}")]
pub struct MalformedRecord(pub String);

impl Record {
    /// Parse one line of the underlying source (expected to be a single JSON
    /// object) into a `Record`. Malformed lines are the caller's concern to
    /// count and skip — this just reports the error.
    pub fn parse_line(line: &str) -> Result<Record, MalformedRecord> {
        serde_json::from_str(line).map_err(|e| MalformedRecord(format!("{e}: {line}")))
    }
}
