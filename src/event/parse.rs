//! Event parser (C3; §4.3).
//!
//! Given a `Record` already classified into an `EventKind`, extract the
//! typed fields. Malformed payloads yield `ParseError` and are dropped by the
//! caller with a counted warning (§7 — never fatal).

use super::classify::{EventKind, FixedPeerState};
use super::endpoint::{Endpoint, EndpointParseError, RawConnectionId};
use super::{Direction, Event, PeerConnState};
use crate::record::Record;
use std::net::IpAddr;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has unexpected type")]
    WrongType(&'static str),
    #[error("endpoint parse error: {0}")]
    Endpoint(#[from] EndpointParseError),
    #[error("unrecognised peer status change transition: '{0}'")]
    UnknownTransition(String),
    #[error("malformed peer status change string: '{0}'")]
    MalformedStatusChange(String),
}

/// Parse a classified record into its `Event`. `kind` must be the result of
/// `classify(&record.ns)` — callers are expected to have already dropped
/// records that don't classify.
pub fn parse(record: &Record, kind: EventKind) -> Result<Event, ParseError> {
    let at = record.at;
    let data = &record.data;
    match kind {
        EventKind::DownloadedHeader => {
            let block_hash = get_str(data, "block")?.to_owned();
            let block_number = get_u64(data, "blockNo")?;
            let slot = get_u64(data, "slot")?;
            let peer_endpoint = peer_remote_endpoint(data)?;
            Ok(Event::DownloadedHeader {
                at,
                block_hash,
                block_number,
                slot,
                peer_endpoint,
            })
        }
        EventKind::SendFetchRequest => {
            let block_hash = get_str(data, "head")?.to_owned();
            let peer_endpoint = peer_remote_endpoint(data)?;
            Ok(Event::SendFetchRequest {
                at,
                block_hash,
                peer_endpoint,
            })
        }
        EventKind::CompletedBlockFetch => {
            let block_hash = get_str(data, "block")?.to_owned();
            let block_size = get_u64(data, "size")?;
            let delay = get_f64(data, "delay").unwrap_or(0.0);
            let peer_endpoint = peer_remote_endpoint(data)?;
            Ok(Event::CompletedBlockFetch {
                at,
                block_hash,
                block_size,
                peer_endpoint,
                delay,
            })
        }
        EventKind::AddedToCurrentChain => {
            let block_hash = first_header_hash(data)?;
            Ok(Event::AddedToCurrentChain { at, block_hash })
        }
        EventKind::SwitchedToAFork => {
            let block_hash = first_header_hash(data)?;
            Ok(Event::SwitchedToAFork { at, block_hash })
        }
        EventKind::PeerStateChange {
            direction,
            new_state,
        } => {
            let pair = connection_id(data)?.parse()?;
            Ok(Event::PeerStateChange {
                at,
                direction,
                new_state: fixed_to_conn_state(new_state),
                local_endpoint: pair.local,
                remote_endpoint: pair.remote,
            })
        }
        EventKind::StatusChange => parse_status_change(at, data),
        EventKind::PeerCounters => {
            let idle = get_u64(data, "idlePeers").unwrap_or(0);
            let cold = get_u64(data, "coldPeers").unwrap_or(0);
            let warm = get_u64(data, "warmPeers").unwrap_or(0);
            let hot = get_u64(data, "hotPeers").unwrap_or(0);
            Ok(Event::PeerCounters {
                at,
                idle,
                cold,
                warm,
                hot,
            })
        }
        EventKind::NodeRestarted => Ok(Event::NodeRestarted { at }),
    }
}

fn fixed_to_conn_state(s: FixedPeerState) -> PeerConnState {
    match s {
        FixedPeerState::Cold => PeerConnState::Cold,
        FixedPeerState::Warm => PeerConnState::Warm,
        FixedPeerState::Hot => PeerConnState::Hot,
    }
}

// ---------------------------------------------------------------------------
// JSON payload helpers
// ---------------------------------------------------------------------------

fn get_str<'a>(data: &'a serde_json::Value, field: &'static str) -> Result<&'a str, ParseError> {
    data.get(field)
        .ok_or(ParseError::MissingField(field))?
        .as_str()
        .ok_or(ParseError::WrongType(field))
}

fn get_u64(data: &serde_json::Value, field: &'static str) -> Result<u64, ParseError> {
    let v = data.get(field).ok_or(ParseError::MissingField(field))?;
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or(ParseError::WrongType(field))
}

fn get_f64(data: &serde_json::Value, field: &'static str) -> Result<f64, ParseError> {
    data.get(field)
        .ok_or(ParseError::MissingField(field))?
        .as_f64()
        .ok_or(ParseError::WrongType(field))
}

/// Hash quoting (§4.3): chain-adoption records wrap the hash in one layer of
/// literal `"` inside the JSON string; strip it.
fn first_header_hash(data: &serde_json::Value) -> Result<String, ParseError> {
    let headers = data
        .get("headers")
        .ok_or(ParseError::MissingField("headers"))?
        .as_array()
        .ok_or(ParseError::WrongType("headers"))?;
    let first = headers.first().ok_or(ParseError::MissingField("headers[0]"))?;
    let raw = first
        .get("hash")
        .ok_or(ParseError::MissingField("headers[0].hash"))?
        .as_str()
        .ok_or(ParseError::WrongType("headers[0].hash"))?;
    Ok(strip_quote_layer(raw).to_owned())
}

fn strip_quote_layer(s: &str) -> &str {
    s.strip_prefix('"').unwrap_or(s).strip_suffix('"').unwrap_or(s)
}

fn connection_id(data: &serde_json::Value) -> Result<RawConnectionId, ParseError> {
    let peer = data.get("peer").unwrap_or(data);
    let raw = peer
        .get("connectionId")
        .ok_or(ParseError::MissingField("connectionId"))?;
    serde_json::from_value(raw.clone()).map_err(|_| ParseError::WrongType("connectionId"))
}

fn peer_remote_endpoint(data: &serde_json::Value) -> Result<Endpoint, ParseError> {
    Ok(connection_id(data)?.parse()?.remote)
}

// ---------------------------------------------------------------------------
// Peer status-change string (§4.3)
// ---------------------------------------------------------------------------

const TRANSITIONS: &[(&str, &str, PeerConnState)] = &[
    ("ColdToWarm", "ColdToWarm", PeerConnState::Warm),
    ("WarmToHot", "WarmToHot", PeerConnState::Hot),
    ("WarmToCooling", "WarmToCooling", PeerConnState::Cooling),
    ("HotToWarm", "HotToWarm", PeerConnState::Warm),
    ("HotToCooling", "HotToCooling", PeerConnState::Cooling),
    ("CoolingToCold", "CoolingToCold", PeerConnState::Cold),
];

fn parse_status_change(
    at: chrono::DateTime<chrono::Utc>,
    data: &serde_json::Value,
) -> Result<Event, ParseError> {
    let s = get_str(data, "peerStatusChangeType")?;

    let (transition, rest) = TRANSITIONS
        .iter()
        .find_map(|(prefix, _, state)| s.strip_prefix(prefix).map(|rest| ((*prefix, *state), rest)))
        .ok_or_else(|| ParseError::UnknownTransition(s.to_owned()))?;
    let new_state = transition.1;
    let rest = rest.trim_start();

    let (local_str, remote_str) = if let Some(inner) = rest.strip_prefix("(Just ") {
        // "<From>To<To> (Just <LOCAL_ADDR>:<LPORT>) <REMOTE_ADDR>:<RPORT>"
        let close = inner
            .find(')')
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let local = inner[..close].trim();
        let remote = inner[close + 1..].trim();
        (local.to_owned(), remote.to_owned())
    } else if let Some(inner) = rest.strip_prefix("(ConnectionId {") {
        // "<From>To<To> (ConnectionId {localAddress = <LOCAL>, remoteAddress = <REMOTE>})"
        let inner = inner
            .strip_suffix("})")
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let local = extract_after(inner, "localAddress = ", ",")
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let remote = extract_after(inner, "remoteAddress = ", "")
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        (local, remote)
    } else {
        return Err(ParseError::MalformedStatusChange(s.to_owned()));
    };

    let local_endpoint = parse_and_validate_addr_port(&local_str)?;
    let remote_endpoint = parse_and_validate_addr_port(&remote_str)?;

    Ok(Event::PeerStateChange {
        at,
        direction: Direction::Outbound,
        new_state,
        local_endpoint,
        remote_endpoint,
    })
}

fn extract_after(s: &str, marker: &str, stop_at: &str) -> Option<String> {
    let start = s.find(marker)? + marker.len();
    let tail = &s[start..];
    let end = if stop_at.is_empty() {
        tail.len()
    } else {
        tail.find(stop_at).unwrap_or(tail.len())
    };
    Some(tail[..end].trim().to_owned())
}

/// Parse `"ADDR:PORT"` (IPv4 or bracketed IPv6) and validate the address as
/// a legal IP, per §4.3's explicit requirement.
fn parse_and_validate_addr_port(s: &str) -> Result<Endpoint, ParseError> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('[') {
        let close = rest
            .find(']')
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let addr = &rest[..close];
        let port_str = rest[close + 1..]
            .strip_prefix(':')
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| ParseError::MalformedStatusChange(format!("invalid IP: {addr}")))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| ParseError::MalformedStatusChange(format!("invalid port: {port_str}")))?;
        Ok(Endpoint::new(ip, port))
    } else {
        let colon = s
            .rfind(':')
            .ok_or_else(|| ParseError::MalformedStatusChange(s.to_owned()))?;
        let addr = &s[..colon];
        let port_str = &s[colon + 1..];
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| ParseError::MalformedStatusChange(format!("invalid IP: {addr}")))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| ParseError::MalformedStatusChange(format!("invalid port: {port_str}")))?;
        Ok(Endpoint::new(ip, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::classify::classify;
    use serde_json::json;

    fn rec(ns: &str, at: &str, data: serde_json::Value) -> Record {
        Record {
            at: at.parse().unwrap(),
            ns: ns.to_owned(),
            data,
            host: "node1".to_owned(),
        }
    }

    #[test]
    fn parses_downloaded_header() {
        let r = rec(
            "ChainSync.Client.DownloadedHeader",
            "2025-09-06T21:08:19.564977Z",
            json!({
                "block": "f825861a675f36184516f5d1eba691251fc3f58ddf0256d6df9c50e4f693795d",
                "blockNo": 3583696,
                "slot": 90536899,
                "peer": {"connectionId": "172.0.118.125:30002 113.43.234.98:4001"}
            }),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::DownloadedHeader {
                block_number,
                slot,
                peer_endpoint,
                ..
            } => {
                assert_eq!(block_number, 3583696);
                assert_eq!(slot, 90536899);
                assert_eq!(peer_endpoint.port, 4001);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_completed_block_fetch() {
        let r = rec(
            "BlockFetch.Client.CompletedBlockFetch",
            "2025-09-06T21:27:23.334299Z",
            json!({
                "block": "6e3288ea3f13757b37e0b060d13236f05bb0571f0f95d0fbd3a3a237b8eb6a6b",
                "delay": 0.33412554,
                "peer": {"connectionId": "172.0.118.125:30002 24.192.179.116:5000"},
                "size": 1999
            }),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::CompletedBlockFetch {
                block_size,
                peer_endpoint,
                ..
            } => {
                assert_eq!(block_size, 1999);
                assert_eq!(peer_endpoint.port, 5000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn strips_quote_layer_from_adopted_hash() {
        let r = rec(
            "ChainDB.AddBlockEvent.AddedToCurrentChain",
            "2025-09-06T21:22:01.210917Z",
            json!({
                "headers": [{"hash": "\"92fbe0b805a718e9269052a37ca38fe78cc90a7a704428ed1e008be90fbf2356\""}]
            }),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::AddedToCurrentChain { block_hash, .. } => {
                assert_eq!(
                    block_hash,
                    "92fbe0b805a718e9269052a37ca38fe78cc90a7a704428ed1e008be90fbf2356"
                );
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_status_change_just_form() {
        let r = rec(
            "Net.PeerSelection.Actions.StatusChanged",
            "2025-09-24T13:04:05.509293074Z",
            json!({"peerStatusChangeType": "ColdToWarm (Just 172.0.118.125:3001) 3.228.174.253:6000"}),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::PeerStateChange {
                direction,
                new_state,
                local_endpoint,
                remote_endpoint,
                ..
            } => {
                assert_eq!(direction, Direction::Outbound);
                assert_eq!(new_state, PeerConnState::Warm);
                assert_eq!(local_endpoint.port, 3001);
                assert_eq!(remote_endpoint.port, 6000);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_status_change_connection_id_form_with_ipv6() {
        let r = rec(
            "Net.PeerSelection.Actions.StatusChanged",
            "2025-09-24T13:04:05Z",
            json!({"peerStatusChangeType": "WarmToCooling (ConnectionId {localAddress = [2a05:d014:1105:a503:8406:964c:5278:4c24]:3001, remoteAddress = [2600:4040:b4fd:f40:42e5:c5de:7ed3:ce19]:33525})"}),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::PeerStateChange {
                new_state,
                local_endpoint,
                remote_endpoint,
                ..
            } => {
                assert_eq!(new_state, PeerConnState::Cooling);
                assert_eq!(local_endpoint.port, 3001);
                assert_eq!(remote_endpoint.port, 33525);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_status_change_with_unknown_transition() {
        let r = rec(
            "Net.PeerSelection.Actions.StatusChanged",
            "2025-09-24T13:04:05Z",
            json!({"peerStatusChangeType": "FooToBar (Just 1.2.3.4:1) 5.6.7.8:2"}),
        );
        let kind = classify(&r.ns).unwrap();
        let err = parse(&r, kind).unwrap_err();
        assert!(matches!(err, ParseError::UnknownTransition(_)));
    }

    #[test]
    fn rejects_status_change_with_invalid_ip() {
        let r = rec(
            "Net.PeerSelection.Actions.StatusChanged",
            "2025-09-24T13:04:05Z",
            json!({"peerStatusChangeType": "ColdToWarm (Just not-an-ip:3001) 3.228.174.253:6000"}),
        );
        let kind = classify(&r.ns).unwrap();
        let err = parse(&r, kind).unwrap_err();
        assert!(matches!(err, ParseError::MalformedStatusChange(_)));
    }

    #[test]
    fn parses_peer_state_change_from_fixed_namespace() {
        let r = rec(
            "Net.InboundGovernor.Remote.PromotedToHotRemote",
            "2025-09-24T13:32:19.888897773Z",
            json!({
                "connectionId": {
                    "localAddress": {"address": "172.0.118.125", "port": "3001"},
                    "remoteAddress": {"address": "85.106.4.146", "port": "3001"}
                }
            }),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::PeerStateChange {
                direction,
                new_state,
                ..
            } => {
                assert_eq!(direction, Direction::Inbound);
                assert_eq!(new_state, PeerConnState::Hot);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn parses_peer_counters() {
        let r = rec(
            "Net.InboundGovernor.Remote.InboundGovernorCounters",
            "2025-09-24T13:32:19.517600273Z",
            json!({"coldPeers": 53, "hotPeers": 0, "idlePeers": 1, "warmPeers": 1}),
        );
        let kind = classify(&r.ns).unwrap();
        let ev = parse(&r, kind).unwrap();
        match ev {
            Event::PeerCounters {
                idle,
                cold,
                warm,
                hot,
                ..
            } => {
                assert_eq!((idle, cold, warm, hot), (1, 53, 1, 0));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let r = rec(
            "ChainSync.Client.DownloadedHeader",
            "2025-09-06T21:08:19Z",
            json!({"blockNo": 1, "slot": 1}),
        );
        let kind = classify(&r.ns).unwrap();
        let err = parse(&r, kind).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("block")));
    }
}
