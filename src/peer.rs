//! Peer wire protocol.
//!
//! This module implements the message codec, stream framing and the
//! per-connection session state machine of the BitTorrent peer protocol.

mod bitfield;
mod error;
mod framing;
mod message;
mod peer_id;
mod session;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use framing::FrameReader;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use session::{ChokingState, Inbound, PeerSession};

#[cfg(test)]
mod tests;
