use bytes::Bytes;
use std::time::Instant;

/// Download state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Not requested, or requested so long ago that it was reclaimed.
    Free,
    /// Requested from a peer, answer outstanding.
    Pending,
    /// Payload received.
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: u32,
    pub offset: u32,
    pub length: u32,
}

impl BlockRequest {
    pub fn new(piece: u32, offset: u32, length: u32) -> Self {
        Self {
            piece,
            offset,
            length,
        }
    }
}

/// A sub-range of a piece together with its buffered payload.
#[derive(Debug, Clone)]
pub struct Block {
    pub offset: u32,
    pub length: u32,
    pub state: BlockState,
    pub data: Bytes,
    pub requested_at: Option<Instant>,
}

impl Block {
    pub fn new(offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            state: BlockState::Free,
            data: Bytes::new(),
            requested_at: None,
        }
    }

    pub fn reset(&mut self) {
        self.state = BlockState::Free;
        self.data = Bytes::new();
        self.requested_at = None;
    }
}

pub fn compute_block_count(piece_length: u64, block_size: u32) -> u32 {
    piece_length.div_ceil(block_size as u64) as u32
}

/// Length of block `block_index`: `block_size` for all but the last block,
/// which gets the remainder (or a full block if there is none).
pub fn compute_block_length(piece_length: u64, block_index: u32, block_size: u32) -> u32 {
    let offset = block_index as u64 * block_size as u64;
    let remaining = piece_length.saturating_sub(offset);
    remaining.min(block_size as u64) as u32
}
