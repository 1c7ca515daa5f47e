//! Endpoint extraction (§4.3).
//!
//! `connectionId` appears in two shapes in node log payloads:
//! - a string `"LOCAL_ADDR:LPORT REMOTE_ADDR:RPORT"` (addresses may be IPv4
//!   literal or bracketed IPv6), or
//! - an object `{localAddress: {address, port}, remoteAddress: {address, port}}`.
//!
//! `serialise(parse(s)) == s` holds for well-formed string-shaped input
//! (§8 round-trip law); the object shape round-trips through its own fields.

use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;

/// `(ip, port)` identifying one end of a peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Endpoint { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port),
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port),
        }
    }
}

/// A parsed `(local, remote)` connection pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPair {
    pub local: Endpoint,
    pub remote: Endpoint,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointParseError {
    #[error("empty connectionId")]
    Empty,
    #[error("connectionId string must have exactly one space separating local/remote: '{0}'")]
    MissingSeparator(String),
    #[error("invalid address:port '{0}'")]
    InvalidAddrPort(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("invalid IP address '{0}'")]
    InvalidIp(String),
}

/// The raw `connectionId` field as it appears in JSON: either the combined
/// string form, or the split-object form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawConnectionId {
    String(String),
    Object {
        #[serde(rename = "localAddress")]
        local_address: RawAddrPort,
        #[serde(rename = "remoteAddress")]
        remote_address: RawAddrPort,
    },
}

#[derive(Debug, Deserialize)]
pub struct RawAddrPort {
    pub address: String,
    /// Node logs inconsistently render this as a JSON number or a string.
    #[serde(deserialize_with = "port_from_str_or_num")]
    pub port: u16,
}

fn port_from_str_or_num<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u16),
    }
    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}

impl RawConnectionId {
    pub fn parse(&self) -> Result<ConnectionPair, EndpointParseError> {
        match self {
            RawConnectionId::String(s) => parse_connection_id_str(s),
            RawConnectionId::Object {
                local_address,
                remote_address,
            } => {
                let local = parse_addr_port(&local_address.address, local_address.port)?;
                let remote = parse_addr_port(&remote_address.address, remote_address.port)?;
                Ok(ConnectionPair { local, remote })
            }
        }
    }
}

/// Parse the string form: `"LOCAL_ADDR:LPORT REMOTE_ADDR:RPORT"`.
pub fn parse_connection_id_str(s: &str) -> Result<ConnectionPair, EndpointParseError> {
    if s.is_empty() {
        return Err(EndpointParseError::Empty);
    }
    // Split on the FIRST space: bracketed IPv6 addresses never contain a space.
    let (local_part, remote_part) = s
        .split_once(' ')
        .ok_or_else(|| EndpointParseError::MissingSeparator(s.to_owned()))?;
    let local = parse_one_endpoint(local_part)?;
    let remote = parse_one_endpoint(remote_part)?;
    Ok(ConnectionPair { local, remote })
}

/// Parse a single `(ipv6-in-brackets | ipv4) ":" port` token.
fn parse_one_endpoint(token: &str) -> Result<Endpoint, EndpointParseError> {
    if let Some(rest) = token.strip_prefix('[') {
        // Bracketed IPv6: "[addr]:port"
        let close = rest
            .find(']')
            .ok_or_else(|| EndpointParseError::InvalidAddrPort(token.to_owned()))?;
        let addr_str = &rest[..close];
        let after = &rest[close + 1..];
        let port_str = after
            .strip_prefix(':')
            .ok_or_else(|| EndpointParseError::InvalidAddrPort(token.to_owned()))?;
        let ip: IpAddr = addr_str
            .parse()
            .map_err(|_| EndpointParseError::InvalidIp(addr_str.to_owned()))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(port_str.to_owned()))?;
        Ok(Endpoint::new(ip, port))
    } else {
        // IPv4: "addr:port" — split on the LAST colon (addr itself has none).
        let colon = token
            .rfind(':')
            .ok_or_else(|| EndpointParseError::InvalidAddrPort(token.to_owned()))?;
        let addr_str = &token[..colon];
        let port_str = &token[colon + 1..];
        let ip: IpAddr = addr_str
            .parse()
            .map_err(|_| EndpointParseError::InvalidIp(addr_str.to_owned()))?;
        let port: u16 = port_str
            .parse()
            .map_err(|_| EndpointParseError::InvalidPort(port_str.to_owned()))?;
        Ok(Endpoint::new(ip, port))
    }
}

fn parse_addr_port(address: &str, port: u16) -> Result<Endpoint, EndpointParseError> {
    let ip: IpAddr = address
        .parse()
        .map_err(|_| EndpointParseError::InvalidIp(address.to_owned()))?;
    Ok(Endpoint::new(ip, port))
}

/// Serialise a `ConnectionPair` back to the string form, for the round-trip
/// property test (`serialise(parse(s)) == s` on well-formed input).
pub fn serialise_connection_id(pair: &ConnectionPair) -> String {
    format!("{} {}", pair.local, pair.remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipv4_string_form() {
        let s = "172.0.118.125:30002 24.192.179.116:5000";
        let pair = parse_connection_id_str(s).unwrap();
        assert_eq!(pair.local.port, 30002);
        assert_eq!(pair.remote.port, 5000);
        assert_eq!(serialise_connection_id(&pair), s);
    }

    #[test]
    fn parses_bracketed_ipv6_string_form() {
        let s = "[::1]:30002 [2001:db8::1]:5000";
        let pair = parse_connection_id_str(s).unwrap();
        assert_eq!(pair.local.ip.to_string(), "::1");
        assert_eq!(pair.remote.ip.to_string(), "2001:db8::1");
        assert_eq!(serialise_connection_id(&pair), s);
    }

    #[test]
    fn mixed_v4_and_bracketed_v6() {
        let s = "10.0.0.1:3001 [fe80::1]:4001";
        let pair = parse_connection_id_str(s).unwrap();
        assert_eq!(pair.local.ip.to_string(), "10.0.0.1");
        assert_eq!(pair.remote.ip.to_string(), "fe80::1");
    }

    #[test]
    fn rejects_empty_string() {
        assert_eq!(parse_connection_id_str(""), Err(EndpointParseError::Empty));
    }

    #[test]
    fn rejects_missing_space_separator() {
        let err = parse_connection_id_str("10.0.0.1:3001").unwrap_err();
        assert!(matches!(err, EndpointParseError::MissingSeparator(_)));
    }

    #[test]
    fn rejects_invalid_ip() {
        let err = parse_connection_id_str("not.an.ip:3001 10.0.0.1:4001").unwrap_err();
        assert!(matches!(err, EndpointParseError::InvalidIp(_)));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = parse_connection_id_str("10.0.0.1:notaport 10.0.0.2:4001").unwrap_err();
        assert!(matches!(err, EndpointParseError::InvalidPort(_)));
    }

    #[test]
    fn parses_object_form() {
        let json = r#"{
            "localAddress": {"address": "172.0.118.125", "port": 30002},
            "remoteAddress": {"address": "24.192.179.116", "port": 5000}
        }"#;
        let raw: RawConnectionId = serde_json::from_str(json).unwrap();
        let pair = raw.parse().unwrap();
        assert_eq!(pair.local.port, 30002);
        assert_eq!(pair.remote.ip.to_string(), "24.192.179.116");
    }

    #[test]
    fn parses_object_form_with_string_ports() {
        let json = r#"{
            "localAddress": {"address": "172.0.118.125", "port": "3001"},
            "remoteAddress": {"address": "85.106.4.146", "port": "3001"}
        }"#;
        let raw: RawConnectionId = serde_json::from_str(json).unwrap();
        let pair = raw.parse().unwrap();
        assert_eq!(pair.local.port, 3001);
        assert_eq!(pair.remote.port, 3001);
    }

    #[test]
    fn parses_string_form_via_untagged_enum() {
        let json = "\"172.0.118.125:30002 24.192.179.116:5000\"";
        let raw: RawConnectionId = serde_json::from_str(json).unwrap();
        assert!(raw.parse().is_ok());
    }
}
