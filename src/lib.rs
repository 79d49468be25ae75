//! cefbit - BitTorrent block exchange over TCP and named-data networks
//!
//! This library downloads a single-file torrent from a swarm of peers using
//! the BitTorrent peer wire protocol, and can move the same pieces over a
//! named-data network under CUBIC congestion control.
//!
//! # Modules
//!
//! - [`peer`] - Wire codec, stream framing and per-connection session state
//! - [`piece`] - Block assembly, SHA-1 validation and the piece store
//! - [`storage`] - The backing file pieces are persisted to
//! - [`manager`] - Peer pool, request scheduling and health eviction
//! - [`engine`] - Per-torrent download task
//! - [`ndn`] - Named-data transport and the CUBIC window
//! - [`metainfo`] - The parsed torrent record the engine consumes
//! - [`tracker`] - Peer discovery interface
//! - [`config`] - TOML configuration

pub mod config;
pub mod constants;
pub mod engine;
pub mod manager;
pub mod metainfo;
pub mod ndn;
pub mod peer;
pub mod piece;
pub mod storage;
pub mod tracker;

pub use config::{Config, ConfigError};
pub use engine::{EngineError, EngineEvent, EngineHandle, EngineMode, TorrentEngine};
pub use manager::{CommunicationManager, Connector, ManagerError, PeerKey, TcpConnector};
pub use metainfo::{InfoHash, MetainfoError, TorrentMeta};
pub use ndn::{ContentName, Cubic, NamedDataFace, NdnError, NdnTransport, Packet};
pub use peer::{Bitfield, Handshake, Message, PeerError, PeerId, PeerSession};
pub use piece::{BlockOutcome, BlockRequest, BlockState, PieceEvent, PieceStore};
pub use storage::{StorageError, TorrentStorage};
pub use tracker::{StaticTracker, Tracker, TrackerError};
