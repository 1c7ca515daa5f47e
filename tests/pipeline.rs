//! End-to-end integration tests driving the public pipeline: raw JSON
//! records through classification, parsing, correlation and peer tracking.

use blockperf_agent::correlator::Correlator;
use blockperf_agent::event::classify::classify;
use blockperf_agent::event::parse::parse;
use blockperf_agent::event::{Direction, Endpoint, Event, PeerConnState};
use blockperf_agent::peers::{PeerTracker, SocketStatus, SocketTuple};
use blockperf_agent::record::Record;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

fn rec(ns: &str, at: chrono::DateTime<chrono::Utc>, data: serde_json::Value) -> Record {
    Record {
        at,
        ns: ns.to_owned(),
        data,
        host: "relay-01".to_owned(),
    }
}

fn route(rec: Record) -> Option<Event> {
    let kind = classify(&rec.ns)?;
    parse(&rec, kind).ok()
}

fn local_endpoint() -> Endpoint {
    Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 3001)
}

const SLOT: u64 = 5000;

/// `slot_time(genesis_start_unix(), SLOT)` resolves to exactly this instant.
fn slot_time() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(1_600_000_000, 0).unwrap()
}

fn genesis_start_unix() -> i64 {
    1_600_000_000 - SLOT as i64
}

/// The header event itself, 50ms after `slot_time()` — used as the anchor
/// for the rest of the lifecycle's timestamps in `full_block_lifecycle_produces_a_sample`.
fn t0() -> chrono::DateTime<chrono::Utc> {
    slot_time() + chrono::Duration::milliseconds(50)
}

#[test]
fn unrecognised_namespace_is_dropped_before_parsing() {
    let r = rec("Mempool.AddedTx", t0(), serde_json::json!({}));
    assert!(route(r).is_none());
}

#[test]
fn full_block_lifecycle_produces_a_sample() {
    let correlator = Correlator::new(
        genesis_start_unix(),
        Duration::from_secs(0),
        Duration::from_secs(600),
        local_endpoint(),
        764824073,
        "0.1.0".to_owned(),
    );

    let peer_conn = "203.0.113.5:3001 10.0.0.1:4001";
    let hash = "abc123deadbeef";

    let events = vec![
        rec(
            "ChainSync.Client.DownloadedHeader",
            t0(),
            serde_json::json!({"block": hash, "blockNo": 100, "slot": SLOT, "peer": {"connectionId": peer_conn}}),
        ),
        rec(
            "BlockFetch.Client.SendFetchRequest",
            t0() + chrono::Duration::milliseconds(100),
            serde_json::json!({"head": hash, "peer": {"connectionId": peer_conn}}),
        ),
        rec(
            "BlockFetch.Client.CompletedBlockFetch",
            t0() + chrono::Duration::milliseconds(300),
            serde_json::json!({"block": hash, "size": 50000, "peer": {"connectionId": peer_conn}, "delay": 0.1}),
        ),
        rec(
            "ChainDB.AddBlockEvent.AddedToCurrentChain",
            t0() + chrono::Duration::milliseconds(350),
            serde_json::json!({"headers": [{"hash": format!("\"{hash}\"")}]}),
        ),
    ];

    for r in events {
        if let Some(ev) = route(r) {
            correlator.ingest(ev);
        }
    }

    let samples = correlator.drain();
    assert_eq!(samples.len(), 1);
    let sample = &samples[0];
    assert_eq!(sample.block_hash, hash);
    assert_eq!(sample.block_number, 100);
    assert_eq!(sample.block_size, 50000);
    assert_eq!(sample.header_delta_ms, 50);
    assert_eq!(sample.block_request_delta_ms, 100);

    correlator.mark_submitted(&sample.block_hash);
    assert!(correlator.drain().is_empty());
}

#[test]
fn peer_lifecycle_tracks_state_then_drops_on_reconciliation() {
    let tracker = PeerTracker::new(3001);
    let local = local_endpoint();
    let remote = Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), 4001);

    let cold_to_warm = rec(
        "Net.PeerSelection.Actions.StatusChanged",
        t0(),
        serde_json::json!({"peerStatusChangeType": format!("ColdToWarm (Just {local}) {remote}")}),
    );
    let warm_to_hot = rec(
        "Net.PeerSelection.Actions.StatusChanged",
        t0() + chrono::Duration::seconds(1),
        serde_json::json!({"peerStatusChangeType": format!("WarmToHot (Just {local}) {remote}")}),
    );

    for r in [cold_to_warm, warm_to_hot] {
        if let Some(ev) = route(r) {
            tracker.ingest(&ev);
        }
    }

    let stats_before = tracker.stats();
    assert_eq!(stats_before.total, 1);
    assert_eq!(stats_before.outbound_hot, 1);

    // Reconciliation sees no ESTABLISHED socket for this peer any more.
    tracker.reconcile(&[]);
    let stats_after = tracker.stats();
    assert_eq!(stats_after.total, 0);
}

#[test]
fn socket_reconciliation_adds_unknown_peer_then_matches_by_full_endpoint() {
    let tracker = PeerTracker::new(3001);
    let local = local_endpoint();
    let remote = Endpoint::new(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9)), 5001);

    tracker.reconcile(&[SocketTuple {
        local_endpoint: local,
        remote_endpoint: remote,
        status: SocketStatus::Established,
    }]);

    let unknown = tracker.unknown_peers();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0], remote);

    // A peer at the same IP but a different port must not match the
    // existing unknown entry (the fixed IP-only-matching bug).
    let other_port_same_ip = Endpoint::new(remote.ip, remote.port + 1);
    tracker.reconcile(&[SocketTuple {
        local_endpoint: local,
        remote_endpoint: other_port_same_ip,
        status: SocketStatus::Established,
    }]);
    let unknown_after = tracker.unknown_peers();
    assert_eq!(unknown_after.len(), 2);
}

#[test]
fn direction_and_conn_state_serialize_lowercase() {
    assert_eq!(serde_json::to_string(&Direction::Inbound).unwrap(), "\"inbound\"");
    assert_eq!(serde_json::to_string(&PeerConnState::Hot).unwrap(), "\"hot\"");
}
