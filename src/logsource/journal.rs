//! systemd-journal follow adapter (§4.1, §10.1).
//!
//! Grounded in `examples/original_source/src/blockperf/logreader.py`'s
//! `JournalCtlLogReader`: shells out to `journalctl -f` rather than linking
//! `libsystemd`, one JSON object per stdout line.

use super::{LogSourceError, RecordStream, MAX_LINE_BYTES, STOP_GRACE};
use crate::record::Record;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::warn;

pub struct JournalSource {
    unit: String,
    process: Option<Child>,
}

impl JournalSource {
    pub fn new(unit: impl Into<String>) -> Self {
        JournalSource {
            unit: unit.into(),
            process: None,
        }
    }

    fn follow_command(&self) -> Command {
        let mut cmd = Command::new("journalctl");
        cmd.args(["-f", "--unit", &self.unit, "-o", "cat", "--no-pager", "--since", "now"]);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd
    }

    pub async fn open(&mut self) -> Result<(), LogSourceError> {
        let child = self
            .follow_command()
            .spawn()
            .map_err(|e| LogSourceError::Spawn(format!("journalctl -f --unit {}: {e}", self.unit)))?;
        self.process = Some(child);
        Ok(())
    }

    pub fn records(&mut self) -> RecordStream {
        let Some(child) = self.process.as_mut() else {
            return Box::pin(async_stream::stream! {
                yield Err(crate::record::MalformedRecord("journal source not open".to_owned()));
            });
        };
        let Some(stdout) = child.stdout.take() else {
            return Box::pin(async_stream::stream! {
                yield Err(crate::record::MalformedRecord("journal stdout already taken".to_owned()));
            });
        };
        let reader = BufReader::with_capacity(MAX_LINE_BYTES, stdout);
        Box::pin(async_stream::stream! {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match Record::parse_line(&line) {
                            Ok(record) => yield Ok(record),
                            Err(e) => {
                                warn!(error = %e, "skipping malformed journal line");
                                yield Err(e);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "journal stdout read error, ending stream");
                        break;
                    }
                }
            }
        })
    }

    /// One-shot: `journalctl --unit <unit> -o cat --no-pager --since "<n> hours ago"`,
    /// filtered client-side by `substring`.
    pub async fn search(&self, substring: &str, since_hours: u64) -> Result<Vec<Record>, LogSourceError> {
        let since = format!("{since_hours} hours ago");
        let output = Command::new("journalctl")
            .args(["--unit", &self.unit, "-o", "cat", "--no-pager", "--since", &since])
            .output()
            .await
            .map_err(|e| LogSourceError::Io(e.to_string()))?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(parse_matching_lines(&text, substring))
    }

    /// §4.5 restart replay: find the most recent `Startup.NodeInfo` marker in
    /// a bounded lookback window and return every record from that point on.
    pub async fn replay_since_last_start(&self) -> Result<Vec<Record>, LogSourceError> {
        const LOOKBACK_HOURS: u64 = 48;
        let matches = self.search("Startup.NodeInfo", LOOKBACK_HOURS).await?;
        let Some(marker) = matches.last() else {
            return Ok(Vec::new());
        };
        let all = self.search("", LOOKBACK_HOURS).await?;
        Ok(all.into_iter().filter(|r| r.at >= marker.at).collect())
    }

    pub async fn close(&mut self) -> Result<(), LogSourceError> {
        let Some(mut child) = self.process.take() else {
            return Ok(());
        };
        if let Some(id) = child.id() {
            // SIGTERM via the polite `start_kill`/terminate path: tokio's
            // Child::start_kill is SIGKILL on unix, so send SIGTERM
            // ourselves first and give it STOP_GRACE to exit.
            unsafe {
                libc_kill(id as i32, 15);
            }
        }
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("journalctl did not terminate within grace period, killing");
                child.kill().await.map_err(|e| LogSourceError::Io(e.to_string()))
            }
        }
    }
}

fn parse_matching_lines(text: &str, substring: &str) -> Vec<Record> {
    text.lines()
        .filter(|l| substring.is_empty() || l.contains(substring))
        .filter_map(|l| Record::parse_line(l).ok())
        .collect()
}

/// Minimal `kill(2)` wrapper — avoids pulling in the `libc` crate for one
/// syscall. Unix-only; `id` is always a valid pid from `Child::id()`.
unsafe fn libc_kill(pid: i32, sig: i32) {
    unsafe extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    unsafe {
        kill(pid, sig);
    }
}
