//! Named-data transport.
//!
//! Pieces are addressed as `ccnx:/BitTorrent/<info_hash>/<piece_index>` and
//! moved whole: an interest names a piece and the matching data packet
//! carries its bytes. The number of interests released per tick is governed
//! by a [`Cubic`] congestion window.

mod cubic;
mod error;
mod face;
mod name;
mod transport;

pub use cubic::Cubic;
pub use error::NdnError;
pub use face::{MemoryFace, NamedDataFace, Packet, PacketKind};
pub use name::ContentName;
pub use transport::{NdnSettings, NdnTransport};
