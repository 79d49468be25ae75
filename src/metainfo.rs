//! Torrent metadata.
//!
//! Bencoded `.torrent` parsing happens elsewhere; this module holds the
//! already-parsed record the engine consumes, [`TorrentMeta`], and the
//! [`InfoHash`] that identifies it. Records can be loaded from JSON:
//!
//! ```
//! use cefbit::metainfo::TorrentMeta;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let meta = TorrentMeta::from_json(r#"{
//!     "info_hash": "c12fe1c06bba254a9dc9f519b335aa7c1367a88a",
//!     "piece_length": 16,
//!     "length": 20,
//!     "pieces": [
//!         "0000000000000000000000000000000000000000",
//!         "1111111111111111111111111111111111111111"
//!     ]
//! }"#)?;
//!
//! assert_eq!(meta.piece_count(), 2);
//! # Ok(())
//! # }
//! ```

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::TorrentMeta;
