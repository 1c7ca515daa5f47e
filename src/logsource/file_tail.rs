//! Plain file tail adapter (§4.1, §10.1).
//!
//! Grounded in `examples/original_source/src/blockperf/nodelogs/logreader.py`'s
//! `FileLogReader` — the distillation's "file tail" backend name refers to
//! this; the original reads the whole file once, this adapter follows
//! appends the way `tail -f` does, which is what a long-running live phase
//! actually needs.

use super::{LogSourceError, RecordStream, MAX_LINE_BYTES};
use crate::record::Record;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::warn;

const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(200);

pub struct FileTailSource {
    path: PathBuf,
}

impl FileTailSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTailSource { path: path.into() }
    }

    pub async fn open(&mut self) -> Result<(), LogSourceError> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| LogSourceError::Io(e.to_string()))?
        {
            return Err(LogSourceError::Io(format!(
                "log file {} does not exist",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub fn records(&mut self) -> RecordStream {
        let path = self.path.clone();
        Box::pin(async_stream::stream! {
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to open tailed file");
                    return;
                }
            };
            let mut file = file;
            if let Err(e) = file.seek(std::io::SeekFrom::End(0)).await {
                warn!(error = %e, "failed to seek to end of tailed file");
                return;
            }
            let mut reader = BufReader::with_capacity(MAX_LINE_BYTES, file);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match Record::parse_line(trimmed) {
                            Ok(record) => yield Ok(record),
                            Err(e) => {
                                warn!(error = %e, "skipping malformed tailed line");
                                yield Err(e);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "tailed file read error, ending stream");
                        break;
                    }
                }
            }
        })
    }

    pub async fn search(&self, substring: &str, since_hours: u64) -> Result<Vec<Record>, LogSourceError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LogSourceError::Io(e.to_string()))?;
        let cutoff = chrono::Utc::now() - chrono::Duration::hours(since_hours as i64);
        Ok(contents
            .lines()
            .filter(|l| substring.is_empty() || l.contains(substring))
            .filter_map(|l| Record::parse_line(l).ok())
            .filter(|r| r.at >= cutoff)
            .collect())
    }

    pub async fn replay_since_last_start(&self) -> Result<Vec<Record>, LogSourceError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| LogSourceError::Io(e.to_string()))?;
        let records: Vec<Record> = contents.lines().filter_map(|l| Record::parse_line(l).ok()).collect();
        let last_marker = records.iter().rposition(|r| r.ns == "Startup.NodeInfo");
        match last_marker {
            Some(idx) => Ok(records[idx..].to_vec()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn close(&mut self) -> Result<(), LogSourceError> {
        Ok(())
    }
}
