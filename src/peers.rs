//! Peer-state tracker (C5; §4.5).

use crate::event::{Direction, Endpoint, Event, PeerConnState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// One peer's connection-state pair (§3 Peer).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peer {
    pub local_endpoint: Endpoint,
    pub remote_endpoint: Endpoint,
    pub state_inbound: PeerConnState,
    pub state_outbound: PeerConnState,
    pub last_updated: DateTime<Utc>,
}

/// `(local_endpoint, remote_endpoint, status)` as read from the OS socket
/// table (C5's external collaborator, §4.5 "Socket reconciliation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketTuple {
    pub local_endpoint: Endpoint,
    pub remote_endpoint: Endpoint,
    pub status: SocketStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Established,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub struct PeerStats {
    pub inbound_cold: u64,
    pub inbound_warm: u64,
    pub inbound_hot: u64,
    pub inbound_cooling: u64,
    pub inbound_unknown: u64,
    pub inbound_unconnected: u64,
    pub outbound_cold: u64,
    pub outbound_warm: u64,
    pub outbound_hot: u64,
    pub outbound_cooling: u64,
    pub outbound_unknown: u64,
    pub outbound_unconnected: u64,
    pub total: usize,
}

pub struct PeerTracker {
    peers: Mutex<HashMap<Endpoint, Peer>>,
    local_listen_port: u16,
}

impl PeerTracker {
    pub fn new(local_listen_port: u16) -> Self {
        PeerTracker {
            peers: Mutex::new(HashMap::new()),
            local_listen_port,
        }
    }

    /// §4.5 "Per-event protocol".
    pub fn apply_state_change(
        &self,
        at: DateTime<Utc>,
        direction: Direction,
        new_state: PeerConnState,
        local: Endpoint,
        remote: Endpoint,
    ) {
        let mut peers = self.peers.lock().expect("peer tracker mutex poisoned");
        let peer = peers.entry(remote).or_insert_with(|| Peer {
            local_endpoint: local,
            remote_endpoint: remote,
            state_inbound: PeerConnState::Unknown,
            state_outbound: PeerConnState::Unknown,
            last_updated: at,
        });
        match direction {
            Direction::Inbound => peer.state_inbound = new_state,
            Direction::Outbound => peer.state_outbound = new_state,
        }
        if at > peer.last_updated {
            peer.last_updated = at;
        }
    }

    /// Route a classified `Event` through the tracker. `PeerCounters` and
    /// anything not carrying peer endpoints is ignored here — the caller
    /// routes `PeerCounters` to `crate::metrics` instead.
    pub fn ingest(&self, event: &Event) {
        if let Event::PeerStateChange {
            at,
            direction,
            new_state,
            local_endpoint,
            remote_endpoint,
        } = event
        {
            self.apply_state_change(*at, *direction, *new_state, *local_endpoint, *remote_endpoint);
        }
    }

    /// Clears the peer map; called by the scheduler on `NodeRestarted` only
    /// when configured to do so (§9 open question — default is to retain).
    pub fn clear(&self) {
        self.peers.lock().expect("peer tracker mutex poisoned").clear();
    }

    /// §4.5 "Socket reconciliation": filters to `ESTABLISHED` connections on
    /// our listen port, inserts missing peers as `Unknown`/`Unknown`, and
    /// removes peers no longer present in the filtered set.
    pub fn reconcile(&self, sockets: &[SocketTuple]) {
        let filtered: HashMap<Endpoint, Endpoint> = sockets
            .iter()
            .filter(|s| s.status == SocketStatus::Established && s.local_endpoint.port == self.local_listen_port)
            .map(|s| (s.remote_endpoint, s.local_endpoint))
            .collect();

        let mut peers = self.peers.lock().expect("peer tracker mutex poisoned");

        let stale: Vec<Endpoint> = peers
            .keys()
            .filter(|k| !filtered.contains_key(k))
            .copied()
            .collect();
        for remote in stale {
            peers.remove(&remote);
            info!(remote = %remote, "peer removed: no longer present in OS socket table");
        }

        for (remote, local) in filtered {
            peers.entry(remote).or_insert_with(|| Peer {
                local_endpoint: local,
                remote_endpoint: remote,
                state_inbound: PeerConnState::Unknown,
                state_outbound: PeerConnState::Unknown,
                last_updated: Utc::now(),
            });
        }
    }

    /// Peers whose both states are `Unknown` — candidates for unknown-peer
    /// backfill (§4.5). Deliberate deviation from the original source: this
    /// matches on the full remote endpoint (IP and port), not IP alone —
    /// see DESIGN.md for the rationale.
    pub fn unknown_peers(&self) -> Vec<Endpoint> {
        self.peers
            .lock()
            .expect("peer tracker mutex poisoned")
            .values()
            .filter(|p| p.state_inbound == PeerConnState::Unknown && p.state_outbound == PeerConnState::Unknown)
            .map(|p| p.remote_endpoint)
            .collect()
    }

    pub fn keys(&self) -> Vec<Endpoint> {
        self.peers.lock().expect("peer tracker mutex poisoned").keys().copied().collect()
    }

    pub fn get(&self, remote: &Endpoint) -> Option<Peer> {
        self.peers.lock().expect("peer tracker mutex poisoned").get(remote).copied()
    }

    /// §4.5 "Statistics": counts per `(direction, state)` plus a total.
    pub fn stats(&self) -> PeerStats {
        let peers = self.peers.lock().expect("peer tracker mutex poisoned");
        let mut s = PeerStats {
            inbound_cold: 0,
            inbound_warm: 0,
            inbound_hot: 0,
            inbound_cooling: 0,
            inbound_unknown: 0,
            inbound_unconnected: 0,
            outbound_cold: 0,
            outbound_warm: 0,
            outbound_hot: 0,
            outbound_cooling: 0,
            outbound_unknown: 0,
            outbound_unconnected: 0,
            total: peers.len(),
        };
        for p in peers.values() {
            match p.state_inbound {
                PeerConnState::Cold => s.inbound_cold += 1,
                PeerConnState::Warm => s.inbound_warm += 1,
                PeerConnState::Hot => s.inbound_hot += 1,
                PeerConnState::Cooling => s.inbound_cooling += 1,
                PeerConnState::Unknown => s.inbound_unknown += 1,
                PeerConnState::Unconnected => s.inbound_unconnected += 1,
            }
            match p.state_outbound {
                PeerConnState::Cold => s.outbound_cold += 1,
                PeerConnState::Warm => s.outbound_warm += 1,
                PeerConnState::Hot => s.outbound_hot += 1,
                PeerConnState::Cooling => s.outbound_cooling += 1,
                PeerConnState::Unknown => s.outbound_unknown += 1,
                PeerConnState::Unconnected => s.outbound_unconnected += 1,
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ep(last_octet: u8, port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last_octet)), port)
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn peer_state_transition_sequence() {
        let t = PeerTracker::new(3001);
        let r = ep(1, 5000);
        let local = ep(9, 3001);
        t.apply_state_change(now(), Direction::Inbound, PeerConnState::Warm, local, r);
        t.apply_state_change(
            now() + chrono::Duration::seconds(1),
            Direction::Inbound,
            PeerConnState::Hot,
            local,
            r,
        );
        let third = now() + chrono::Duration::seconds(2);
        t.apply_state_change(third, Direction::Outbound, PeerConnState::Cold, local, r);

        let peer = t.get(&r).unwrap();
        assert_eq!(peer.state_inbound, PeerConnState::Hot);
        assert_eq!(peer.state_outbound, PeerConnState::Cold);
        assert_eq!(peer.last_updated, third);
    }

    #[test]
    fn socket_reconciliation_drops_and_adds() {
        let t = PeerTracker::new(3001);
        let r1 = ep(1, 5000);
        let r2 = ep(2, 5000);
        let r3 = ep(3, 5000);
        let local = ep(9, 3001);
        t.apply_state_change(now(), Direction::Inbound, PeerConnState::Warm, local, r1);
        t.apply_state_change(now(), Direction::Inbound, PeerConnState::Warm, local, r2);

        t.reconcile(&[
            SocketTuple {
                local_endpoint: local,
                remote_endpoint: r1,
                status: SocketStatus::Established,
            },
            SocketTuple {
                local_endpoint: local,
                remote_endpoint: r3,
                status: SocketStatus::Established,
            },
        ]);

        let mut keys = t.keys();
        keys.sort();
        let mut expected = vec![r1, r3];
        expected.sort();
        assert_eq!(keys, expected);

        let p3 = t.get(&r3).unwrap();
        assert_eq!(p3.state_inbound, PeerConnState::Unknown);
        assert_eq!(p3.state_outbound, PeerConnState::Unknown);
    }

    #[test]
    fn reconciliation_ignores_non_established_and_wrong_port() {
        let t = PeerTracker::new(3001);
        let local = ep(9, 3001);
        let wrong_port_local = ep(9, 9999);
        let r1 = ep(1, 5000);
        let r2 = ep(2, 5000);
        t.reconcile(&[
            SocketTuple {
                local_endpoint: local,
                remote_endpoint: r1,
                status: SocketStatus::Other,
            },
            SocketTuple {
                local_endpoint: wrong_port_local,
                remote_endpoint: r2,
                status: SocketStatus::Established,
            },
        ]);
        assert!(t.keys().is_empty());
    }

    #[test]
    fn new_peer_starts_unknown_on_both_sides() {
        let t = PeerTracker::new(3001);
        let r = ep(1, 5000);
        let local = ep(9, 3001);
        t.apply_state_change(now(), Direction::Inbound, PeerConnState::Warm, local, r);
        let peer = t.get(&r).unwrap();
        assert_eq!(peer.state_outbound, PeerConnState::Unknown);
    }
}
