//! Event variants and the classify/parse pipeline (C2, C3; §3, §4.2, §4.3).

pub mod classify;
pub mod endpoint;
pub mod parse;

pub use endpoint::Endpoint;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection direction relative to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// They initiated to us.
    Inbound,
    /// We initiated to them.
    Outbound,
}

/// Peer connection-governor state, as reported by the node.
///
/// `Unknown`/`Unconnected` are not reachable via `PeerStateChange` — they are
/// applied by the peer tracker itself (see `crate::peers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnState {
    Cold,
    Warm,
    Hot,
    Cooling,
    Unknown,
    Unconnected,
}

/// The closed set of event variants C3 can produce (§3).
///
/// Every other namespace is dropped at C2; there is no "other" variant here
/// by design — an unrecognised namespace never reaches the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DownloadedHeader {
        at: DateTime<Utc>,
        block_hash: String,
        block_number: u64,
        slot: u64,
        peer_endpoint: Endpoint,
    },
    SendFetchRequest {
        at: DateTime<Utc>,
        block_hash: String,
        peer_endpoint: Endpoint,
    },
    CompletedBlockFetch {
        at: DateTime<Utc>,
        block_hash: String,
        block_size: u64,
        peer_endpoint: Endpoint,
        delay: f64,
    },
    AddedToCurrentChain {
        at: DateTime<Utc>,
        block_hash: String,
    },
    SwitchedToAFork {
        at: DateTime<Utc>,
        block_hash: String,
    },
    PeerStateChange {
        at: DateTime<Utc>,
        direction: Direction,
        new_state: PeerConnState,
        local_endpoint: Endpoint,
        remote_endpoint: Endpoint,
    },
    PeerCounters {
        at: DateTime<Utc>,
        idle: u64,
        cold: u64,
        warm: u64,
        hot: u64,
    },
    NodeRestarted {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The block hash this event carries, if any — used by C4 to route
    /// events into their group.
    pub fn block_hash(&self) -> Option<&str> {
        match self {
            Event::DownloadedHeader { block_hash, .. }
            | Event::SendFetchRequest { block_hash, .. }
            | Event::CompletedBlockFetch { block_hash, .. }
            | Event::AddedToCurrentChain { block_hash, .. }
            | Event::SwitchedToAFork { block_hash, .. } => Some(block_hash),
            Event::PeerStateChange { .. }
            | Event::PeerCounters { .. }
            | Event::NodeRestarted { .. } => None,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::DownloadedHeader { at, .. }
            | Event::SendFetchRequest { at, .. }
            | Event::CompletedBlockFetch { at, .. }
            | Event::AddedToCurrentChain { at, .. }
            | Event::SwitchedToAFork { at, .. }
            | Event::PeerStateChange { at, .. }
            | Event::PeerCounters { at, .. }
            | Event::NodeRestarted { at, .. } => *at,
        }
    }
}
