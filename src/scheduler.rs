//! Scheduler (C7; §4.7).
//!
//! A single-process, cooperative supervisor owning four activities:
//! ingestion, sample drain, socket reconciliation, and statistics emission.
//! Any uncaught failure is fatal to the process; graceful shutdown cancels
//! all activities and awaits them with a grace period.

use crate::correlator::Correlator;
use crate::event::{self, classify::classify};
use crate::logsource::LogSource;
use crate::peers::PeerTracker;
use crate::submit::Submitter;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("ingestion task failed: {0}")]
    Ingestion(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleIntervals {
    pub check_interval: Duration,
    pub min_age: Duration,
    pub socket_reconcile: Duration,
    pub stats_emission: Duration,
}

impl Default for ScheduleIntervals {
    fn default() -> Self {
        ScheduleIntervals {
            check_interval: Duration::from_secs(2),
            min_age: Duration::from_secs(10),
            socket_reconcile: Duration::from_secs(30),
            stats_emission: Duration::from_secs(30),
        }
    }
}

pub struct Scheduler {
    correlator: Arc<Correlator>,
    peers: Arc<PeerTracker>,
    submitter: Arc<Submitter>,
    metrics: Arc<crate::metrics::PeerCounterGauges>,
    intervals: ScheduleIntervals,
    clear_peers_on_restart: bool,
    shutdown: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        correlator: Arc<Correlator>,
        peers: Arc<PeerTracker>,
        submitter: Arc<Submitter>,
        metrics: Arc<crate::metrics::PeerCounterGauges>,
        intervals: ScheduleIntervals,
        clear_peers_on_restart: bool,
    ) -> Self {
        Scheduler {
            correlator,
            peers,
            submitter,
            metrics,
            intervals,
            clear_peers_on_restart,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Drives all four activities until a shutdown signal arrives or one
    /// activity fails. §4.7: "any uncaught failure in any activity is fatal
    /// to the process; the supervisor cancels the others and exits."
    pub async fn run(&self, mut source: LogSource) -> Result<(), TaskError> {
        let shutdown = self.shutdown.clone();
        let ingestion = self.run_ingestion(&mut source, shutdown.clone());
        let drain = self.run_drain_loop(shutdown.clone());
        let reconcile = self.run_reconciliation_loop(shutdown.clone());
        let stats = self.run_stats_loop(shutdown.clone());

        tokio::select! {
            r = ingestion => r,
            _ = drain => Ok(()),
            _ = reconcile => Ok(()),
            _ = stats => Ok(()),
        }
    }

    /// Installs SIGINT/SIGTERM handlers and signals shutdown to all activities.
    pub async fn wait_for_shutdown_signal(&self) {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        self.shutdown.notify_waiters();
    }

    /// Activity 1: historical replay (counted, never submitted), then the
    /// live record stream, routed to C4/C5.
    async fn run_ingestion(&self, source: &mut LogSource, shutdown: Arc<Notify>) -> Result<(), TaskError> {
        source.open().await.map_err(|e| TaskError::Ingestion(e.to_string()))?;

        let replay = source
            .replay_since_last_start()
            .await
            .map_err(|e| TaskError::Ingestion(e.to_string()))?;
        if !replay.is_empty() {
            info!(count = replay.len(), "counting historical replay records (not submitted)");
        }

        let mut stream = source.records();
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    let _ = source.close().await;
                    return Ok(());
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(record)) => self.route(record),
                        Some(Err(e)) => {
                            warn!(error = %e, "dropping malformed record");
                        }
                        None => {
                            let _ = source.close().await;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn route(&self, record: crate::record::Record) {
        let Some(kind) = classify(&record.ns) else {
            return;
        };
        match event::parse::parse(&record, kind) {
            Ok(ev) => self.apply(ev),
            Err(e) => warn!(ns = %record.ns, error = %e, "dropping record: parse error"),
        }
    }

    fn apply(&self, ev: crate::event::Event) {
        match ev {
            crate::event::Event::PeerStateChange {
                at,
                direction,
                new_state,
                local_endpoint,
                remote_endpoint,
            } => {
                self.peers
                    .apply_state_change(at, direction, new_state, local_endpoint, remote_endpoint);
            }
            crate::event::Event::PeerCounters { idle, cold, warm, hot, .. } => {
                self.metrics.set(idle, cold, warm, hot);
            }
            crate::event::Event::NodeRestarted { .. } => {
                if self.clear_peers_on_restart {
                    self.peers.clear();
                }
            }
            other => self.correlator.ingest(other),
        }
    }

    /// Activity 2: sample drain, every `check_interval`.
    async fn run_drain_loop(&self, shutdown: Arc<Notify>) {
        let mut tick = tokio::time::interval(self.intervals.check_interval);
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tick.tick() => {
                    for sample in self.correlator.drain() {
                        let hash = sample.block_hash.clone();
                        match self.submitter.submit_block_sample(&sample).await {
                            Ok(ack) => {
                                debug!(block_hash = %hash, id = %ack.id, "sample submitted");
                                self.correlator.mark_submitted(&hash);
                            }
                            Err(e) if e.is_retryable() => {
                                warn!(block_hash = %hash, error = %e, "submit failed, will retry");
                            }
                            Err(e) => {
                                warn!(block_hash = %hash, error = %e, "permanent submit failure, evicting group");
                                self.correlator.mark_submitted(&hash);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Activity 3: socket reconciliation, every 30s.
    async fn run_reconciliation_loop(&self, shutdown: Arc<Notify>) {
        let mut tick = tokio::time::interval(self.intervals.socket_reconcile);
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tick.tick() => {
                    match crate::socket_enum::enumerate() {
                        Ok(sockets) => self.peers.reconcile(&sockets),
                        Err(e) => warn!(error = %e, "socket enumeration failed"),
                    }
                }
            }
        }
    }

    /// Activity 4: statistics emission, every 30s.
    async fn run_stats_loop(&self, shutdown: Arc<Notify>) {
        let mut tick = tokio::time::interval(self.intervals.stats_emission);
        loop {
            tokio::select! {
                _ = shutdown.notified() => return,
                _ = tick.tick() => {
                    let stats = self.peers.stats();
                    let (idle, cold, warm, hot) = self.metrics.snapshot();
                    info!(
                        total_peers = stats.total,
                        inbound_hot = stats.inbound_hot,
                        outbound_hot = stats.outbound_hot,
                        counters_idle = idle,
                        counters_cold = cold,
                        counters_warm = warm,
                        counters_hot = hot,
                        "peer statistics"
                    );
                }
            }
        }
    }
}
