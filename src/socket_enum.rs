//! OS socket enumeration (C5's external collaborator, §4.5, §10.1).
//!
//! Linux-only: reads `/proc/net/tcp` and `/proc/net/tcp6`, the same
//! source `psutil.net_connections()` reads under the hood in the original
//! implementation (`examples/original_source/.../listeners/peer.py`).

use crate::peers::{SocketStatus, SocketTuple};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, thiserror::Error)]
pub enum SocketEnumError {
    #[error("reading {path}: {source}")]
    Io {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// `TCP_ESTABLISHED` as defined by the kernel's `net/tcp_states.h`.
const TCP_ESTABLISHED_HEX: &str = "01";

/// Enumerate established (and other) TCP connections from `/proc/net/tcp{,6}`.
pub fn enumerate() -> Result<Vec<SocketTuple>, SocketEnumError> {
    let mut out = Vec::new();
    out.extend(parse_proc_net_tcp(
        &read("/proc/net/tcp")?,
        false,
    ));
    if let Ok(contents) = std::fs::read_to_string("/proc/net/tcp6") {
        out.extend(parse_proc_net_tcp(&contents, true));
    }
    Ok(out)
}

fn read(path: &'static str) -> Result<String, SocketEnumError> {
    std::fs::read_to_string(path).map_err(|source| SocketEnumError::Io { path, source })
}

fn parse_proc_net_tcp(contents: &str, is_v6: bool) -> Vec<SocketTuple> {
    let mut out = Vec::new();
    for line in contents.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            continue;
        }
        let Some(local) = parse_hex_addr_port(fields[1], is_v6) else {
            continue;
        };
        let Some(remote) = parse_hex_addr_port(fields[2], is_v6) else {
            continue;
        };
        let status = if fields[3].eq_ignore_ascii_case(TCP_ESTABLISHED_HEX) {
            SocketStatus::Established
        } else {
            SocketStatus::Other
        };
        out.push(SocketTuple {
            local_endpoint: local,
            remote_endpoint: remote,
            status,
        });
    }
    out
}

/// Parse one `"ADDR:PORT"` field from `/proc/net/tcp{,6}`, where `ADDR` is a
/// little-endian hex-encoded IPv4 or IPv6 address and `PORT` is big-endian hex.
fn parse_hex_addr_port(field: &str, is_v6: bool) -> Option<crate::event::Endpoint> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let ip = if is_v6 {
        parse_hex_ipv6(addr_hex)?
    } else {
        parse_hex_ipv4(addr_hex)?
    };
    Some(crate::event::Endpoint::new(ip, port))
}

fn parse_hex_ipv4(hex: &str) -> Option<IpAddr> {
    if hex.len() != 8 {
        return None;
    }
    let word = u32::from_str_radix(hex, 16).ok()?;
    let bytes = word.to_le_bytes();
    Some(IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])))
}

fn parse_hex_ipv6(hex: &str) -> Option<IpAddr> {
    if hex.len() != 32 {
        return None;
    }
    let mut bytes = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(8).enumerate() {
        let chunk_str = std::str::from_utf8(chunk).ok()?;
        let word = u32::from_str_radix(chunk_str, 16).ok()?;
        let le = word.to_le_bytes();
        bytes[i * 4..i * 4 + 4].copy_from_slice(&le);
    }
    Some(IpAddr::V6(Ipv6Addr::from(bytes)))
}
