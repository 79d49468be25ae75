//! Peer discovery.
//!
//! Announce request construction lives outside this crate; the engine only
//! needs something that turns a torrent into candidate peer addresses.

mod error;
mod static_list;

pub use error::TrackerError;
pub use static_list::StaticTracker;

use crate::metainfo::TorrentMeta;
use async_trait::async_trait;
use std::net::SocketAddr;

/// Source of candidate peers for a torrent.
#[async_trait]
pub trait Tracker: Send + Sync {
    async fn get_peers(&self, meta: &TorrentMeta) -> Result<Vec<SocketAddr>, TrackerError>;
}

#[cfg(test)]
mod tests;
