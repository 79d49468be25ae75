//! Piece and block bookkeeping.
//!
//! A torrent's payload is split into pieces, and each piece into blocks of
//! at most [`BLOCK_SIZE`](crate::constants::BLOCK_SIZE) bytes. Blocks move
//! through Free, Pending and Full; a piece becomes complete once all its
//! blocks are Full and the SHA-1 of their concatenation matches.

mod assembly;
mod block;
mod store;

pub use assembly::{hash_matches, BlockWrite, Piece};
pub use block::{compute_block_count, compute_block_length, Block, BlockRequest, BlockState};
pub use store::{BlockOutcome, PieceEvent, PieceStore};
