//! Network configuration table (§3 "Network configuration", §6).
//!
//! A fixed mapping `network → {magic, genesis_start_unix, api_base_url}`.
//! Not runtime-configurable beyond selecting one of the three rows by name.

/// One row of the network table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub name: &'static str,
    pub magic: u32,
    pub genesis_start_unix: i64,
    pub api_base_url: &'static str,
}

const NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "mainnet",
        magic: 764824073,
        genesis_start_unix: 1591566291,
        api_base_url: "https://api.openblockperf.cardano.org",
    },
    NetworkInfo {
        name: "preprod",
        magic: 1,
        genesis_start_unix: 1654041600,
        api_base_url: "https://preprod.api.openblockperf.cardano.org",
    },
    NetworkInfo {
        name: "preview",
        magic: 2,
        genesis_start_unix: 1666656000,
        api_base_url: "https://preview.api.openblockperf.cardano.org",
    },
];

/// Look up a network by its configured name (`mainnet`, `preprod`, `preview`).
pub fn lookup(name: &str) -> Option<NetworkInfo> {
    NETWORKS.iter().copied().find(|n| n.name == name)
}

/// `slot_time = genesis_start_unix + slot`, as a UTC timestamp. `None` if the
/// sum doesn't convert to a valid timestamp — callers drop the sample rather
/// than substitute a bogus value (§10.2).
pub fn slot_time(genesis_start_unix: i64, slot: u64) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(genesis_start_unix + slot as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_all_three_networks() {
        assert_eq!(lookup("mainnet").unwrap().magic, 764824073);
        assert_eq!(lookup("preprod").unwrap().magic, 1);
        assert_eq!(lookup("preview").unwrap().magic, 2);
    }

    #[test]
    fn unknown_network_is_none() {
        assert!(lookup("testnet").is_none());
    }

    #[test]
    fn slot_time_adds_slot_to_genesis() {
        let t = slot_time(1591566291, 1000).unwrap();
        assert_eq!(t.timestamp(), 1591566291 + 1000);
    }

    #[test]
    fn slot_time_is_none_on_overflow() {
        assert!(slot_time(i64::MAX, u64::MAX).is_none());
    }
}
