use super::assembly::{hash_matches, BlockWrite, Piece};
use super::block::{BlockRequest, BlockState};
use crate::constants::{BLOCK_SIZE, PENDING_TIMEOUT};
use crate::metainfo::{InfoHash, TorrentMeta};
use crate::peer::Bitfield;
use crate::storage::{ContentLayout, StorageError, TorrentStorage};
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::Span;

/// What a `set_block` or `set_piece` call did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block (or piece) was already full; nothing changed.
    Duplicate,
    /// Stored; the piece is still missing blocks.
    Stored,
    /// The piece validated and was written to storage.
    Completed,
    /// The piece failed its hash check and was reset to all-Free.
    Rejected,
}

/// Notifications emitted as pieces finish validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceEvent {
    Completed { index: u32 },
    Rejected { index: u32 },
}

/// Block buffering, integrity checking and persistence for one torrent.
///
/// Each piece sits behind its own lock so deliveries for different pieces
/// never contend. Locks are released before any disk or hashing work.
pub struct PieceStore {
    info_hash: InfoHash,
    layout: ContentLayout,
    pieces: Vec<Mutex<Piece>>,
    storage: TorrentStorage,
    pending_timeout: Duration,
    events: Option<mpsc::UnboundedSender<PieceEvent>>,
    span: Span,
}

impl PieceStore {
    /// Creates a store for `meta` backed by the file at `path`.
    pub fn new(meta: &TorrentMeta, path: PathBuf) -> Self {
        Self::with_block_size(meta, path, BLOCK_SIZE)
    }

    pub fn with_block_size(meta: &TorrentMeta, path: PathBuf, block_size: u32) -> Self {
        let layout = meta.layout();
        let pieces = meta
            .pieces
            .iter()
            .enumerate()
            .map(|(i, hash)| {
                let start = i as u64 * meta.piece_length;
                let size = (meta.length - start).min(meta.piece_length);
                Mutex::new(Piece::new(i as u32, size, *hash, block_size.max(1)))
            })
            .collect();

        Self {
            info_hash: meta.info_hash,
            layout,
            pieces,
            storage: TorrentStorage::new(path, layout),
            pending_timeout: PENDING_TIMEOUT,
            events: None,
            span: tracing::debug_span!("store", info_hash = %meta.info_hash),
        }
    }

    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<PieceEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn storage(&self) -> &TorrentStorage {
        &self.storage
    }

    fn slot(&self, index: u32) -> Result<&Mutex<Piece>, StorageError> {
        self.pieces
            .get(index as usize)
            .ok_or(StorageError::InvalidPieceIndex(index))
    }

    fn emit(&self, event: PieceEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Creates the backing file at its full size.
    pub async fn open(&self) -> Result<(), StorageError> {
        self.storage.preallocate().await
    }

    /// Stores one block. Writing a block that is already Full is a no-op.
    ///
    /// When the block completes its piece, the piece is validated and
    /// persisted before this returns.
    pub async fn set_block(
        &self,
        index: u32,
        offset: u32,
        data: Bytes,
    ) -> Result<BlockOutcome, StorageError> {
        let write = {
            let mut piece = self.slot(index)?.lock();
            if piece.is_full() {
                return Ok(BlockOutcome::Duplicate);
            }
            piece.set_block(offset, data)?
        };

        match write {
            BlockWrite::Duplicate => Ok(BlockOutcome::Duplicate),
            BlockWrite::Stored => Ok(BlockOutcome::Stored),
            BlockWrite::Completed => self.validate_and_persist(index).await,
        }
    }

    /// Stores a whole piece by splitting it into blocks.
    pub async fn set_piece(&self, index: u32, data: Bytes) -> Result<BlockOutcome, StorageError> {
        let ready = {
            let mut piece = self.slot(index)?.lock();
            if piece.is_full() {
                return Ok(BlockOutcome::Duplicate);
            }
            if data.len() as u64 != piece.size {
                return Err(StorageError::InvalidLength {
                    piece: index,
                    expected: piece.size,
                    actual: data.len() as u64,
                });
            }

            let block_size = piece.block_size() as usize;
            for start in (0..data.len()).step_by(block_size) {
                let end = (start + block_size).min(data.len());
                piece.set_block(start as u32, data.slice(start..end))?;
            }
            piece.all_blocks_full()
        };

        if ready {
            self.validate_and_persist(index).await
        } else {
            Ok(BlockOutcome::Stored)
        }
    }

    /// Hashes the assembled piece and, on a match, writes it at its
    /// absolute offset and releases the block buffers. On a mismatch every
    /// block goes back to Free.
    pub async fn validate_and_persist(&self, index: u32) -> Result<BlockOutcome, StorageError> {
        let (data, expected) = {
            let piece = self.slot(index)?.lock();
            if piece.is_full() {
                return Ok(BlockOutcome::Duplicate);
            }
            if !piece.all_blocks_full() {
                return Ok(BlockOutcome::Stored);
            }
            (piece.assemble(), piece.hash)
        };

        let (data, valid) = tokio::task::spawn_blocking(move || {
            let valid = hash_matches(&data, &expected);
            (data, valid)
        })
        .await
        .map_err(std::io::Error::other)?;

        if !valid {
            self.slot(index)?.lock().reset();
            tracing::warn!(parent: &self.span, "piece {} failed hash check, discarding", index);
            self.emit(PieceEvent::Rejected { index });
            return Ok(BlockOutcome::Rejected);
        }

        if let Err(e) = self.storage.write_piece(index, &data).await {
            self.slot(index)?.lock().reset();
            return Err(e);
        }

        self.slot(index)?.lock().mark_full(Instant::now());
        tracing::info!(
            parent: &self.span,
            "piece {} complete ({}/{})",
            index,
            self.completed_count(),
            self.piece_count()
        );
        self.emit(PieceEvent::Completed { index });
        Ok(BlockOutcome::Completed)
    }

    /// Reads a validated piece back from storage.
    pub async fn get_data(&self, index: u32) -> Result<Bytes, StorageError> {
        if !self.slot(index)?.lock().is_full() {
            return Err(StorageError::PieceIncomplete(index));
        }
        self.storage.read_piece(index).await
    }

    pub async fn read_block(
        &self,
        index: u32,
        offset: u32,
        length: u32,
    ) -> Result<Bytes, StorageError> {
        if !self.slot(index)?.lock().is_full() {
            return Err(StorageError::PieceIncomplete(index));
        }
        self.storage.read_block(index, offset, length).await
    }

    /// Index of the first Free block of `index`, or `None` if there is none.
    pub fn missing_block(&self, index: u32) -> Option<usize> {
        self.pieces.get(index as usize)?.lock().missing_block()
    }

    /// Requests covering every Free block of `index`.
    pub fn free_blocks(&self, index: u32) -> Vec<BlockRequest> {
        let Some(slot) = self.pieces.get(index as usize) else {
            return Vec::new();
        };
        let piece = slot.lock();
        piece
            .blocks()
            .iter()
            .filter(|b| b.state == BlockState::Free)
            .map(|b| BlockRequest::new(index, b.offset, b.length))
            .collect()
    }

    /// Marks the block a request covers as Pending.
    pub fn mark_pending(&self, request: &BlockRequest) {
        self.mark_pending_at(request, Instant::now());
    }

    pub fn mark_pending_at(&self, request: &BlockRequest, now: Instant) {
        if let Some(slot) = self.pieces.get(request.piece as usize) {
            let mut piece = slot.lock();
            let block_index = (request.offset / piece.block_size()) as usize;
            piece.mark_pending(block_index, now);
        }
    }

    /// Returns Pending blocks older than the pending timeout to Free.
    pub fn sweep_pending(&self) -> usize {
        self.sweep_pending_at(Instant::now())
    }

    pub fn sweep_pending_at(&self, now: Instant) -> usize {
        let released: usize = self
            .pieces
            .iter()
            .map(|slot| slot.lock().release_stale(now, self.pending_timeout))
            .sum();
        if released > 0 {
            tracing::debug!(parent: &self.span, "reclaimed {} stale pending blocks", released);
        }
        released
    }

    pub fn is_piece_complete(&self, index: u32) -> bool {
        self.pieces
            .get(index as usize)
            .is_some_and(|slot| slot.lock().is_full())
    }

    pub fn completed_at(&self, index: u32) -> Option<Instant> {
        self.pieces.get(index as usize)?.lock().completed_at()
    }

    pub fn block_states(&self, index: u32) -> Vec<BlockState> {
        self.pieces
            .get(index as usize)
            .map(|slot| slot.lock().blocks().iter().map(|b| b.state).collect())
            .unwrap_or_default()
    }

    pub fn completed_count(&self) -> usize {
        self.pieces.iter().filter(|slot| slot.lock().is_full()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count() == self.pieces.len()
    }

    /// Fraction of pieces validated, between 0.0 and 1.0.
    pub fn progress(&self) -> f64 {
        if self.pieces.is_empty() {
            return 1.0;
        }
        self.completed_count() as f64 / self.pieces.len() as f64
    }

    /// Indices of pieces not yet validated, in order.
    pub fn incomplete_pieces(&self) -> Vec<u32> {
        (0..self.pieces.len() as u32)
            .filter(|&i| !self.is_piece_complete(i))
            .collect()
    }

    /// The pieces we can serve, as announced to peers.
    pub fn bitfield(&self) -> Bitfield {
        let mut bitfield = Bitfield::new(self.pieces.len());
        for (i, slot) in self.pieces.iter().enumerate() {
            if slot.lock().is_full() {
                bitfield.set_piece(i);
            }
        }
        bitfield
    }

    /// Checks pieces already present in the backing file and marks the ones
    /// whose hash matches as full. Returns how many were recovered.
    pub async fn verify_existing(&self) -> Result<usize, StorageError> {
        if !tokio::fs::try_exists(self.storage.path()).await? {
            return Ok(0);
        }

        let mut recovered = 0;
        for index in 0..self.pieces.len() as u32 {
            let expected = {
                let piece = self.slot(index)?.lock();
                if piece.is_full() {
                    continue;
                }
                piece.hash
            };

            let data = match self.storage.read_piece(index).await {
                Ok(data) => data,
                Err(StorageError::Io(_)) => break,
                Err(e) => return Err(e),
            };

            let valid = tokio::task::spawn_blocking(move || hash_matches(&data, &expected))
                .await
                .map_err(std::io::Error::other)?;
            if valid {
                self.slot(index)?.lock().mark_full(Instant::now());
                recovered += 1;
            }
        }

        if recovered > 0 {
            tracing::info!(parent: &self.span, "recovered {} pieces from disk", recovered);
        }
        Ok(recovered)
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.storage.flush().await
    }
}
