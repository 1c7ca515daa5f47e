//! Log source adapter (C1; §4.1).
//!
//! Two recognised backends — a systemd-journal follow and a plain file
//! tail — unified behind one enum rather than a trait object, since the
//! scheduler owns exactly one of them for the process lifetime and neither
//! needs dynamic dispatch.

pub mod file_tail;
pub mod journal;

use crate::record::{MalformedRecord, Record};
use futures_util::Stream;
use std::pin::Pin;
use std::time::Duration;

/// Maximum single log line this adapter will buffer (§4.1).
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between a polite stop and a forced kill (§4.1, §5).
pub const STOP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum LogSourceError {
    #[error("failed to start log source subprocess: {0}")]
    Spawn(String),
    #[error("log source I/O error: {0}")]
    Io(String),
    #[error("log source not open")]
    NotOpen,
}

pub type RecordStream = Pin<Box<dyn Stream<Item = Result<Record, MalformedRecord>> + Send>>;

/// The selected backend, built from configuration (§4.1 "Selection is a
/// configuration concern").
pub enum LogSource {
    Journal(journal::JournalSource),
    FileTail(file_tail::FileTailSource),
}

impl LogSource {
    /// (a) "open()" — scoped acquisition with guaranteed release on every
    /// exit path, including cancellation.
    pub async fn open(&mut self) -> Result<(), LogSourceError> {
        match self {
            LogSource::Journal(j) => j.open().await,
            LogSource::FileTail(f) => f.open().await,
        }
    }

    /// (b) "records()" — a lazy, infinite sequence of parsed records.
    /// Malformed lines are skipped with a counted warning, never surfaced
    /// as fatal; EOF on the underlying source ends the stream cleanly.
    pub fn records(&mut self) -> RecordStream {
        match self {
            LogSource::Journal(j) => j.records(),
            LogSource::FileTail(f) => f.records(),
        }
    }

    /// (c) "search(substring, since_hours)" — a finite, one-shot sequence
    /// of historical records matching `substring` within the time window.
    pub async fn search(&self, substring: &str, since_hours: u64) -> Result<Vec<Record>, LogSourceError> {
        match self {
            LogSource::Journal(j) => j.search(substring, since_hours).await,
            LogSource::FileTail(f) => f.search(substring, since_hours).await,
        }
    }

    /// (d) "replay_since_last_start()" — records since the most recent node
    /// restart marker; empty if the backend has no such marker.
    pub async fn replay_since_last_start(&self) -> Result<Vec<Record>, LogSourceError> {
        match self {
            LogSource::Journal(j) => j.replay_since_last_start().await,
            LogSource::FileTail(f) => f.replay_since_last_start().await,
        }
    }

    /// Release the underlying resource: polite stop, then a forced stop
    /// after `STOP_GRACE`.
    pub async fn close(&mut self) -> Result<(), LogSourceError> {
        match self {
            LogSource::Journal(j) => j.close().await,
            LogSource::FileTail(f) => f.close().await,
        }
    }
}
