use super::block::{compute_block_count, compute_block_length, Block, BlockState};
use crate::storage::StorageError;
use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use std::time::{Duration, Instant};

/// Result of storing one block into a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWrite {
    /// The block was already full; nothing changed.
    Duplicate,
    /// Stored; other blocks are still missing.
    Stored,
    /// Stored, and every block of the piece is now full.
    Completed,
}

/// One piece and its in-memory block buffers.
///
/// A piece is full only after every block is full and the SHA-1 of the
/// concatenated blocks matches `hash`. Once full, block buffers are released
/// and the data is read back from storage.
#[derive(Debug)]
pub struct Piece {
    pub index: u32,
    pub size: u64,
    pub hash: [u8; 20],
    blocks: Vec<Block>,
    block_size: u32,
    full: bool,
    completed_at: Option<Instant>,
}

impl Piece {
    pub fn new(index: u32, size: u64, hash: [u8; 20], block_size: u32) -> Self {
        let blocks = (0..compute_block_count(size, block_size))
            .map(|i| Block::new(i * block_size, compute_block_length(size, i, block_size)))
            .collect();

        Self {
            index,
            size,
            hash,
            blocks,
            block_size,
            full: false,
            completed_at: None,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Validated and persisted.
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// When the piece was last validated.
    pub fn completed_at(&self) -> Option<Instant> {
        self.completed_at
    }

    /// Every block holds data (the hash has not necessarily been checked).
    pub fn all_blocks_full(&self) -> bool {
        self.blocks.iter().all(|b| b.state == BlockState::Full)
    }

    fn block_index(&self, offset: u32) -> Result<usize, StorageError> {
        let index = (offset / self.block_size) as usize;
        if index >= self.blocks.len() {
            return Err(StorageError::InvalidBlockOffset {
                piece: self.index,
                offset,
            });
        }
        Ok(index)
    }

    pub fn set_block(&mut self, offset: u32, data: Bytes) -> Result<BlockWrite, StorageError> {
        let index = self.block_index(offset)?;
        let block = &mut self.blocks[index];

        if block.state == BlockState::Full {
            return Ok(BlockWrite::Duplicate);
        }

        if data.len() as u64 != block.length as u64 {
            return Err(StorageError::InvalidLength {
                piece: self.index,
                expected: block.length as u64,
                actual: data.len() as u64,
            });
        }

        block.data = data;
        block.state = BlockState::Full;
        block.requested_at = None;

        if self.all_blocks_full() {
            Ok(BlockWrite::Completed)
        } else {
            Ok(BlockWrite::Stored)
        }
    }

    /// Index of the first Free block.
    pub fn missing_block(&self) -> Option<usize> {
        self.blocks.iter().position(|b| b.state == BlockState::Free)
    }

    /// Indices of every Free block, in order.
    pub fn free_blocks(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.state == BlockState::Free)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn mark_pending(&mut self, block_index: usize, now: Instant) {
        if let Some(block) = self.blocks.get_mut(block_index) {
            if block.state == BlockState::Free {
                block.state = BlockState::Pending;
                block.requested_at = Some(now);
            }
        }
    }

    /// Returns Pending blocks older than `timeout` to Free.
    pub fn release_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut released = 0;
        for block in &mut self.blocks {
            let stale = block.state == BlockState::Pending
                && block
                    .requested_at
                    .map_or(true, |at| now.saturating_duration_since(at) > timeout);
            if stale {
                block.reset();
                released += 1;
            }
        }
        released
    }

    /// Drops every block, forcing a full redownload.
    pub fn reset(&mut self) {
        self.full = false;
        self.completed_at = None;
        for block in &mut self.blocks {
            block.reset();
        }
    }

    /// Concatenates the block buffers in block order.
    pub fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size as usize);
        for block in &self.blocks {
            buf.extend_from_slice(&block.data);
        }
        buf.freeze()
    }

    /// Marks the piece full and releases the block buffers.
    pub fn mark_full(&mut self, now: Instant) {
        self.full = true;
        self.completed_at = Some(now);
        for block in &mut self.blocks {
            block.state = BlockState::Full;
            block.data = Bytes::new();
            block.requested_at = None;
        }
    }
}

/// True if the SHA-1 digest of `data` equals `expected`.
pub fn hash_matches(data: &[u8], expected: &[u8; 20]) -> bool {
    Sha1::digest(data).as_slice() == expected
}
