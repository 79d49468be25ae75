use crate::peer::PeerError;
use crate::storage::StorageError;
use crate::tracker::TrackerError;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no eligible peer for piece {piece} at offset {offset}")]
    NoEligiblePeer { piece: u32, offset: u32 },

    #[error("peer limit of {0} reached")]
    PeerLimitReached(usize),

    #[error("already connected to {0}")]
    DuplicatePeer(SocketAddr),

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}
