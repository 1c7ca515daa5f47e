//! Agent configuration loading (§6, §10.3).
//!
//! Environment variables only, prefix `OPENBLOCKPERF_`; no config file.
//! Shape follows the teacher's TOML loader: an intermediate `Raw*` layer
//! with `Option` fields, validated field by field into an immutable
//! `AgentConfig`, with the same defaults-applied-once discipline.

use crate::network::{self, NetworkInfo};
use std::net::IpAddr;

const ENV_PREFIX: &str = "OPENBLOCKPERF_";

/// Immutable, built once at startup and injected (§9 "Dynamic config objects").
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub api_client_id: Option<String>,
    pub api_port: u16,
    pub api_path: String,
    pub network: NetworkInfo,
    pub check_interval_secs: u64,
    pub min_age_secs: u64,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub clear_peers_on_restart: bool,
    pub client_version: String,
    pub log_source: LogSourceConfig,
}

/// Which backend to build the C1 log source adapter from, and its one
/// required parameter. Not named explicitly in the wire-format sections of
/// the spec, but §4.1's two recognised backends have to be selected somehow;
/// modelled the same way the teacher picks a reader backend from config.
#[derive(Debug, Clone)]
pub enum LogSourceConfig {
    Journal { unit: String },
    FileTail { path: std::path::PathBuf },
}

impl AgentConfig {
    /// Base URL the submitter posts to: `{network.api_base_url}:{api_port}{api_path}`.
    pub fn api_base_url(&self) -> String {
        format!(
            "{}:{}{}",
            self.network.api_base_url.trim_end_matches('/'),
            self.api_port,
            self.api_path
        )
    }

    pub fn local_endpoint(&self) -> crate::event::Endpoint {
        crate::event::Endpoint::new(self.local_addr, self.local_port)
    }
}

/// Raw, unvalidated view of the environment — every field optional, read
/// verbatim. Kept separate from `AgentConfig` so defaulting/validation is
/// one pass over plain strings, same shape as the teacher's `RawConfig`.
#[derive(Debug, Default)]
struct RawConfig {
    api_key: Option<String>,
    api_clientid: Option<String>,
    api_port: Option<String>,
    api_path: Option<String>,
    network: Option<String>,
    check_interval: Option<String>,
    min_age: Option<String>,
    local_addr: Option<String>,
    local_port: Option<String>,
    clear_peers_on_restart: Option<String>,
    log_source: Option<String>,
    journal_unit: Option<String>,
    log_file: Option<String>,
}

impl RawConfig {
    fn from_env() -> Self {
        let get = |name: &str| std::env::var(format!("{ENV_PREFIX}{name}")).ok();
        RawConfig {
            api_key: get("API_KEY"),
            api_clientid: get("API_CLIENTID"),
            api_port: get("API_PORT"),
            api_path: get("API_PATH"),
            network: get("NETWORK"),
            check_interval: get("CHECK_INTERVAL"),
            min_age: get("MIN_AGE"),
            local_addr: get("LOCAL_ADDR"),
            local_port: get("LOCAL_PORT"),
            clear_peers_on_restart: get("CLEAR_PEERS_ON_RESTART"),
            log_source: get("LOG_SOURCE"),
            journal_unit: get("JOURNAL_UNIT"),
            log_file: get("LOG_FILE"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {ENV_PREFIX}{0}")]
    MissingField(&'static str),
    #[error("invalid value for {ENV_PREFIX}{field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<AgentConfig, ConfigError> {
    load_from(RawConfig::from_env())
}

fn load_from(raw: RawConfig) -> Result<AgentConfig, ConfigError> {
    let api_key = raw.api_key.ok_or(ConfigError::MissingField("API_KEY"))?;

    let api_port = match raw.api_port {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "API_PORT",
            value: s,
        })?,
        None => 443,
    };

    let api_path = raw.api_path.unwrap_or_else(|| "/api/v0/".to_owned());

    let network_name = raw.network.unwrap_or_else(|| "mainnet".to_owned());
    let network = network::lookup(&network_name).ok_or_else(|| ConfigError::InvalidValue {
        field: "NETWORK",
        value: network_name,
    })?;

    let check_interval_secs = match raw.check_interval {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "CHECK_INTERVAL",
            value: s,
        })?,
        None => 2,
    };

    let min_age_secs = match raw.min_age {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "MIN_AGE",
            value: s,
        })?,
        None => 10,
    };

    let local_addr = match raw.local_addr {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "LOCAL_ADDR",
            value: s,
        })?,
        None => IpAddr::from([0, 0, 0, 0]),
    };

    let local_port = match raw.local_port {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "LOCAL_PORT",
            value: s,
        })?,
        None => 3001,
    };

    let clear_peers_on_restart = match raw.clear_peers_on_restart {
        Some(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            field: "CLEAR_PEERS_ON_RESTART",
            value: s,
        })?,
        None => false,
    };

    let log_source = match raw.log_source.as_deref().unwrap_or("journal") {
        "journal" => LogSourceConfig::Journal {
            unit: raw.journal_unit.unwrap_or_else(|| "cardano-node".to_owned()),
        },
        "file" => LogSourceConfig::FileTail {
            path: raw.log_file.ok_or(ConfigError::MissingField("LOG_FILE"))?.into(),
        },
        other => {
            return Err(ConfigError::InvalidValue {
                field: "LOG_SOURCE",
                value: other.to_owned(),
            })
        }
    };

    Ok(AgentConfig {
        api_key,
        api_client_id: raw.api_clientid,
        api_port,
        api_path,
        network,
        check_interval_secs,
        min_age_secs,
        local_addr,
        local_port,
        clear_peers_on_restart,
        client_version: env!("CARGO_PKG_VERSION").to_owned(),
        log_source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_key() -> RawConfig {
        RawConfig {
            api_key: Some("key123".to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = load_from(RawConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("API_KEY")));
    }

    #[test]
    fn defaults_applied_when_unset() {
        let cfg = load_from(raw_with_key()).unwrap();
        assert_eq!(cfg.api_port, 443);
        assert_eq!(cfg.api_path, "/api/v0/");
        assert_eq!(cfg.network.name, "mainnet");
        assert_eq!(cfg.check_interval_secs, 2);
        assert_eq!(cfg.min_age_secs, 10);
        assert_eq!(cfg.local_port, 3001);
        assert!(!cfg.clear_peers_on_restart);
    }

    #[test]
    fn unknown_network_is_rejected() {
        let mut raw = raw_with_key();
        raw.network = Some("testnet".to_owned());
        let err = load_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "NETWORK", .. }));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut raw = raw_with_key();
        raw.api_port = Some("not-a-port".to_owned());
        let err = load_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "API_PORT", .. }));
    }

    #[test]
    fn api_base_url_combines_network_port_and_path() {
        let cfg = load_from(raw_with_key()).unwrap();
        assert_eq!(cfg.api_base_url(), "https://api.openblockperf.cardano.org:443/api/v0/");
    }

    #[test]
    fn log_source_defaults_to_journal_with_cardano_node_unit() {
        let cfg = load_from(raw_with_key()).unwrap();
        assert!(matches!(cfg.log_source, LogSourceConfig::Journal { unit } if unit == "cardano-node"));
    }

    #[test]
    fn file_log_source_requires_log_file() {
        let mut raw = raw_with_key();
        raw.log_source = Some("file".to_owned());
        let err = load_from(raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("LOG_FILE")));
    }
}
