use super::error::TrackerError;
use super::Tracker;
use crate::metainfo::TorrentMeta;
use async_trait::async_trait;
use std::net::SocketAddr;

/// A tracker that always answers with a fixed peer list.
///
/// Used when peers are supplied up front, e.g. on the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticTracker {
    peers: Vec<SocketAddr>,
}

impl StaticTracker {
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Self { peers }
    }

    /// Parses `ip:port` strings.
    pub fn parse<I, S>(addrs: I) -> Result<Self, TrackerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let peers = addrs
            .into_iter()
            .map(|s| {
                s.as_ref()
                    .parse()
                    .map_err(|_| TrackerError::InvalidAddress(s.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { peers })
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }
}

#[async_trait]
impl Tracker for StaticTracker {
    async fn get_peers(&self, meta: &TorrentMeta) -> Result<Vec<SocketAddr>, TrackerError> {
        tracing::debug!("static tracker: {} peers for {}", self.peers.len(), meta.info_hash);
        Ok(self.peers.clone())
    }
}
