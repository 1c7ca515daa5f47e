//! Block-sample correlator (C4; §4.4).
//!
//! Groups events by `block_hash`; a group becomes a submittable `BlockSample`
//! once complete and sane. All group-map mutations go through a single
//! mutex (§5) rather than an actor — the map is small and contention is
//! confined to two call sites (ingestion, drain).

use crate::event::{Endpoint, Event};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("CompletedBlockFetch for block {0} has no matching SendFetchRequest in its group")]
    NoMatchingRequest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockSample {
    pub block_hash: String,
    pub block_number: u64,
    pub block_size: u64,
    pub slot: u64,
    pub slot_time: DateTime<Utc>,
    pub header_remote_endpoint: Endpoint,
    pub block_remote_endpoint: Endpoint,
    pub header_delta_ms: i64,
    pub block_request_delta_ms: i64,
    pub block_response_delta_ms: i64,
    pub block_adopt_delta_ms: i64,
    pub local_endpoint: Endpoint,
    pub network_magic: u32,
    pub client_version: String,
}

#[derive(Debug, Clone, Copy)]
struct HeaderSlot {
    at: DateTime<Utc>,
    peer_endpoint: Endpoint,
}

#[derive(Debug, Clone, Copy)]
struct RequestSlot {
    at: DateTime<Utc>,
    peer_endpoint: Endpoint,
}

#[derive(Debug, Clone, Copy)]
struct CompletedSlot {
    at: DateTime<Utc>,
    peer_endpoint: Endpoint,
}

#[derive(Debug, Clone, Copy)]
struct AdoptedSlot {
    at: DateTime<Utc>,
}

/// One block's in-progress correlation state (§3 BlockSampleGroup).
#[derive(Debug)]
struct BlockSampleGroup {
    header: Option<HeaderSlot>,
    request: Option<RequestSlot>,
    completed: Option<CompletedSlot>,
    adopted: Option<AdoptedSlot>,
    block_number: Option<u64>,
    slot: Option<u64>,
    slot_time: Option<DateTime<Utc>>,
    block_size: Option<u64>,
    created_at: Instant,
    last_updated: DateTime<Utc>,
    /// Audit log of every event appended, in arrival order. Also where
    /// `SendFetchRequest` events are held until a `CompletedBlockFetch`
    /// resolves the matching one by peer endpoint.
    events: Vec<Event>,
}

impl BlockSampleGroup {
    fn new(now: Instant, at: DateTime<Utc>) -> Self {
        BlockSampleGroup {
            header: None,
            request: None,
            completed: None,
            adopted: None,
            block_number: None,
            slot: None,
            slot_time: None,
            block_size: None,
            created_at: now,
            last_updated: at,
            events: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.header.is_some() && self.request.is_some() && self.completed.is_some() && self.adopted.is_some()
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_updated {
            self.last_updated = at;
        }
    }
}

/// A complete group's sanity verdict (§4.4 "Sanity bounds").
fn is_sane(block_number: u64, slot: u64, block_hash: &str, block_size: u64, deltas: [i64; 4]) -> bool {
    block_number > 0
        && slot > 0
        && !block_hash.is_empty()
        && block_hash.len() < 128
        && block_size > 0
        && block_size < 10_000_000
        && deltas.iter().all(|d| *d > -6_000 && *d < 600_000)
}

pub struct Correlator {
    groups: Mutex<HashMap<String, BlockSampleGroup>>,
    genesis_start_unix: i64,
    min_age: Duration,
    max_age: Duration,
    local_endpoint: Endpoint,
    network_magic: u32,
    client_version: String,
}

impl Correlator {
    pub fn new(
        genesis_start_unix: i64,
        min_age: Duration,
        max_age: Duration,
        local_endpoint: Endpoint,
        network_magic: u32,
        client_version: String,
    ) -> Self {
        Correlator {
            groups: Mutex::new(HashMap::new()),
            genesis_start_unix,
            min_age,
            max_age,
            local_endpoint,
            network_magic,
            client_version,
        }
    }

    /// Apply one block-bearing event to its group (§4.4 "Insert protocol").
    /// On `CorrelationError` the group is evicted immediately — callers don't
    /// need to call anything further for that hash.
    pub fn ingest(&self, event: Event) {
        let Some(hash) = event.block_hash().map(str::to_owned) else {
            return;
        };
        let now = Instant::now();
        let mut groups = self.groups.lock().expect("correlator mutex poisoned");
        let result = {
            let group = groups
                .entry(hash.clone())
                .or_insert_with(|| BlockSampleGroup::new(now, event.at()));
            apply_event(group, event, self.genesis_start_unix)
        };
        if let Err(e) = result {
            warn!(block_hash = %hash, error = %e, "correlation error, evicting group");
            groups.remove(&hash);
        }
    }

    /// §4.4 "Drain": returns samples for complete, sane, old-enough groups.
    /// Insane complete groups and stale incomplete groups are evicted here;
    /// sane groups returned remain in the map until `mark_submitted` is
    /// called for them.
    pub fn drain(&self) -> Vec<BlockSample> {
        let now = Instant::now();
        let mut groups = self.groups.lock().expect("correlator mutex poisoned");
        let mut ready = Vec::new();
        let mut to_evict = Vec::new();

        for (hash, group) in groups.iter() {
            let age = now.duration_since(group.created_at);
            if group.is_complete() {
                if age <= self.min_age {
                    continue;
                }
                match self.build_sample(hash, group) {
                    Some(sample) => ready.push(sample),
                    None => {
                        warn!(block_hash = %hash, "complete group failed sanity bounds, evicting");
                        to_evict.push(hash.clone());
                    }
                }
            } else if age > self.max_age {
                warn!(block_hash = %hash, "incomplete group exceeded max age, evicting");
                to_evict.push(hash.clone());
            }
        }

        for hash in to_evict {
            groups.remove(&hash);
        }
        ready
    }

    /// Remove a group after its sample was submitted successfully.
    pub fn mark_submitted(&self, block_hash: &str) {
        self.groups
            .lock()
            .expect("correlator mutex poisoned")
            .remove(block_hash);
    }

    /// Build the flat sample if the group is sane; `None` otherwise.
    fn build_sample(&self, hash: &str, group: &BlockSampleGroup) -> Option<BlockSample> {
        let header = group.header?;
        let request = group.request?;
        let completed = group.completed?;
        let adopted = group.adopted?;
        let block_number = group.block_number?;
        let slot = group.slot?;
        let slot_time = group.slot_time?;
        let block_size = group.block_size?;

        let header_delta_ms = (header.at - slot_time).num_milliseconds();
        let block_request_delta_ms = (request.at - header.at).num_milliseconds();
        let block_response_delta_ms = (completed.at - request.at).num_milliseconds();
        let block_adopt_delta_ms = (adopted.at - completed.at).num_milliseconds();

        if !is_sane(
            block_number,
            slot,
            hash,
            block_size,
            [
                header_delta_ms,
                block_request_delta_ms,
                block_response_delta_ms,
                block_adopt_delta_ms,
            ],
        ) {
            return None;
        }

        Some(BlockSample {
            block_hash: hash.to_owned(),
            block_number,
            block_size,
            slot,
            slot_time,
            header_remote_endpoint: header.peer_endpoint,
            block_remote_endpoint: completed.peer_endpoint,
            header_delta_ms,
            block_request_delta_ms,
            block_response_delta_ms,
            block_adopt_delta_ms,
            local_endpoint: self.local_endpoint,
            network_magic: self.network_magic,
            client_version: self.client_version.clone(),
        })
    }

    #[cfg(test)]
    fn group_count(&self) -> usize {
        self.groups.lock().unwrap().len()
    }
}

fn apply_event(
    group: &mut BlockSampleGroup,
    event: Event,
    genesis_start_unix: i64,
) -> Result<(), CorrelationError> {
    group.touch(event.at());
    let hash_for_error = event.block_hash().unwrap_or_default().to_owned();

    match &event {
        Event::DownloadedHeader {
            at,
            block_number,
            slot,
            peer_endpoint,
            ..
        } => {
            if group.header.is_none() {
                group.header = Some(HeaderSlot {
                    at: *at,
                    peer_endpoint: *peer_endpoint,
                });
            }
            if group.block_number.is_none() {
                group.block_number = Some(*block_number);
            }
            if group.slot.is_none() {
                group.slot = Some(*slot);
                // `None` here (genesis + slot overflowing a valid timestamp)
                // leaves `group.slot_time` unset; `build_sample` then can't
                // build a sample for this group and it gets evicted on the
                // next drain instead of submitting a fabricated timestamp.
                group.slot_time = crate::network::slot_time(genesis_start_unix, *slot);
            }
        }
        Event::SendFetchRequest { .. } => {
            // Buffered only; resolved by peer match when CompletedBlockFetch arrives.
        }
        Event::CompletedBlockFetch {
            at,
            block_size,
            peer_endpoint,
            ..
        } => {
            if group.completed.is_none() {
                group.completed = Some(CompletedSlot {
                    at: *at,
                    peer_endpoint: *peer_endpoint,
                });
            }
            if group.block_size.is_none() {
                group.block_size = Some(*block_size);
            }
            if group.request.is_none() {
                let matching = group.events.iter().find_map(|e| match e {
                    Event::SendFetchRequest {
                        at: req_at,
                        peer_endpoint: req_peer,
                        ..
                    } if *req_peer == *peer_endpoint => Some(RequestSlot {
                        at: *req_at,
                        peer_endpoint: *req_peer,
                    }),
                    _ => None,
                });
                match matching {
                    Some(slot) => group.request = Some(slot),
                    None => return Err(CorrelationError::NoMatchingRequest(hash_for_error)),
                }
            }
        }
        Event::AddedToCurrentChain { at, .. } | Event::SwitchedToAFork { at, .. } => {
            if group.adopted.is_none() {
                group.adopted = Some(AdoptedSlot { at: *at });
            }
        }
        Event::PeerStateChange { .. } | Event::PeerCounters { .. } | Event::NodeRestarted { .. } => {
            unreachable!("only block-hash-bearing events reach the correlator")
        }
    }

    group.events.push(event);
    Ok(())
}
