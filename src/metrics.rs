//! Peer counter metrics (§9 open question: surfaced as gauges).
//!
//! `PeerCounters` events are observed but never stored on the peer map
//! (§4.5); the scheduler's statistics activity exposes the latest snapshot
//! here rather than discarding it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Last-seen `PeerCounters` snapshot, updated by the ingestion activity and
/// read by the statistics activity. Four independent gauges, not a struct
/// behind a mutex — each field is updated atomically and read without
/// synchronizing with the others, which is fine since they are presented
/// together for display only, never used to drive logic.
#[derive(Debug, Default)]
pub struct PeerCounterGauges {
    idle: AtomicU64,
    cold: AtomicU64,
    warm: AtomicU64,
    hot: AtomicU64,
}

impl PeerCounterGauges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, idle: u64, cold: u64, warm: u64, hot: u64) {
        self.idle.store(idle, Ordering::Relaxed);
        self.cold.store(cold, Ordering::Relaxed);
        self.warm.store(warm, Ordering::Relaxed);
        self.hot.store(hot, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.idle.load(Ordering::Relaxed),
            self.cold.load(Ordering::Relaxed),
            self.warm.load(Ordering::Relaxed),
            self.hot.load(Ordering::Relaxed),
        )
    }
}
