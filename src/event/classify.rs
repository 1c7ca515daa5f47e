//! Record classifier (C2; §4.2).
//!
//! A fixed `namespace → event kind` table. Unknown namespaces yield `None`
//! and are dropped by callers — this table is the sole authority for what
//! counts as "relevant"; adding a variant means adding a row here plus the
//! matching arm in `event::parse`.

use crate::event::Direction;

/// The kind of event a namespace maps to, before field extraction.
///
/// `PeerStateChange` kinds carry the direction and target state inferred
/// from the namespace itself (§4.3 "Direction inference", "State for each of
/// the remote-counterparty namespaces") — the parser still has to pull
/// `connectionId`/`peerStatusChangeType` out of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    DownloadedHeader,
    SendFetchRequest,
    CompletedBlockFetch,
    AddedToCurrentChain,
    SwitchedToAFork,
    /// Namespace already pins direction/new_state; only `StatusChange` (from
    /// `Net.PeerSelection.Actions.StatusChanged`) requires parsing the
    /// transition string to recover them instead.
    PeerStateChange {
        direction: Direction,
        new_state: FixedPeerState,
    },
    /// `Net.PeerSelection.Actions.StatusChanged` — direction is Outbound by
    /// convention (§4.3), but `new_state` (and `local`/`remote`) must be
    /// parsed out of `peerStatusChangeType`.
    StatusChange,
    PeerCounters,
    NodeRestarted,
}

/// The four remote-counterparty states a namespace can pin directly, i.e.
/// everything except `Cooling` (which only appears via the status-change
/// string form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedPeerState {
    Cold,
    Warm,
    Hot,
}

/// Classify a namespace tag. Returns `None` for anything not in the table.
pub fn classify(ns: &str) -> Option<EventKind> {
    use Direction::{Inbound, Outbound};
    use FixedPeerState::{Cold, Hot, Warm};

    match ns {
        "ChainSync.Client.DownloadedHeader" => Some(EventKind::DownloadedHeader),
        "BlockFetch.Client.SendFetchRequest" => Some(EventKind::SendFetchRequest),
        "BlockFetch.Client.CompletedBlockFetch" => Some(EventKind::CompletedBlockFetch),
        "ChainDB.AddBlockEvent.AddedToCurrentChain" => Some(EventKind::AddedToCurrentChain),
        "ChainDB.AddBlockEvent.SwitchedToAFork" => Some(EventKind::SwitchedToAFork),

        "Net.InboundGovernor.Remote.DemotedToColdRemote" => Some(EventKind::PeerStateChange {
            direction: Inbound,
            new_state: Cold,
        }),
        "Net.InboundGovernor.Remote.DemotedToWarmRemote" => Some(EventKind::PeerStateChange {
            direction: Inbound,
            new_state: Warm,
        }),
        "Net.InboundGovernor.Remote.PromotedToWarmRemote" => Some(EventKind::PeerStateChange {
            direction: Inbound,
            new_state: Warm,
        }),
        "Net.InboundGovernor.Remote.PromotedToHotRemote" => Some(EventKind::PeerStateChange {
            direction: Inbound,
            new_state: Hot,
        }),

        "Net.InboundGovernor.Local.DemotedToColdRemote" => Some(EventKind::PeerStateChange {
            direction: Outbound,
            new_state: Cold,
        }),
        "Net.InboundGovernor.Local.DemotedToWarmRemote" => Some(EventKind::PeerStateChange {
            direction: Outbound,
            new_state: Warm,
        }),
        "Net.InboundGovernor.Local.PromotedToWarmRemote" => Some(EventKind::PeerStateChange {
            direction: Outbound,
            new_state: Warm,
        }),
        "Net.InboundGovernor.Local.PromotedToHotRemote" => Some(EventKind::PeerStateChange {
            direction: Outbound,
            new_state: Hot,
        }),

        "Net.PeerSelection.Actions.StatusChanged" => Some(EventKind::StatusChange),

        "Net.InboundGovernor.Remote.InboundGovernorCounters"
        | "Net.InboundGovernor.Local.InboundGovernorCounters" => Some(EventKind::PeerCounters),

        "Startup.NodeInfo" => Some(EventKind::NodeRestarted),

        _ => None,
    }
}
