//! Peer pool and request scheduling.
//!
//! The [`CommunicationManager`] owns the live [`PeerSession`]s of a torrent,
//! reads from them once per tick, feeds block payloads into the
//! [`PieceStore`] and spreads block requests over eligible peers.
//!
//! [`PeerSession`]: crate::peer::PeerSession
//! [`PieceStore`]: crate::piece::PieceStore

mod communication;
mod connector;
mod error;

pub use communication::{CommunicationManager, ManagerSettings, PeerKey};
pub use connector::{BoxedStream, Connector, PeerStream, TcpConnector};
pub use error::ManagerError;
