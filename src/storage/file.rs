use super::error::StorageError;
use std::ops::Range;

/// Byte geometry of a single contiguous torrent payload.
///
/// Piece `i` covers `i * piece_length .. min((i + 1) * piece_length, total_length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLayout {
    pub piece_length: u64,
    pub total_length: u64,
}

impl ContentLayout {
    pub fn new(piece_length: u64, total_length: u64) -> Self {
        Self {
            piece_length,
            total_length,
        }
    }

    pub fn piece_count(&self) -> usize {
        if self.piece_length == 0 {
            return 0;
        }
        self.total_length.div_ceil(self.piece_length) as usize
    }

    /// Size of one piece; only the last piece may be short.
    pub fn piece_size(&self, index: u32) -> Result<u64, StorageError> {
        self.piece_range(index).map(|r| r.end - r.start)
    }

    pub fn piece_range(&self, index: u32) -> Result<Range<u64>, StorageError> {
        if index as usize >= self.piece_count() {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let start = index as u64 * self.piece_length;
        let end = (start + self.piece_length).min(self.total_length);
        Ok(start..end)
    }

    pub fn block_range(
        &self,
        index: u32,
        offset: u32,
        length: u32,
    ) -> Result<Range<u64>, StorageError> {
        let piece = self.piece_range(index)?;
        let start = piece.start + offset as u64;
        let end = start + length as u64;
        if end > piece.end {
            return Err(StorageError::InvalidBlockOffset {
                piece: index,
                offset,
            });
        }
        Ok(start..end)
    }
}
