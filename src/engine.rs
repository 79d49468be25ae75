//! Torrent download orchestration.

mod error;
mod torrent;

pub use error::EngineError;
pub use torrent::{EngineEvent, EngineHandle, TorrentEngine};

use serde::{Deserialize, Serialize};

/// How an engine participates in the swarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Plain peer-to-peer piece exchange.
    #[default]
    Exchange,
    /// Relay between the peer swarm and the named-data network.
    Proxy,
    /// Fetch over the named-data network only.
    #[serde(rename = "client")]
    ClientOnly,
}
