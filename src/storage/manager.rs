use super::error::StorageError;
use super::file::ContentLayout;
use bytes::Bytes;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as TokioMutex;

/// Backing file for one torrent's payload.
///
/// Pieces are written at their absolute offset `index * piece_length`. The
/// file handle is opened lazily and shared by all reads and writes.
pub struct TorrentStorage {
    path: PathBuf,
    layout: ContentLayout,
    handle: TokioMutex<Option<File>>,
}

impl TorrentStorage {
    pub fn new(path: PathBuf, layout: ContentLayout) -> Self {
        Self {
            path,
            layout,
            handle: TokioMutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    async fn ensure_parent_dirs(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn open(&self) -> Result<File, StorageError> {
        Self::ensure_parent_dirs(&self.path).await?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .await?;
        Ok(file)
    }

    /// Creates the file if needed and sizes it to the full payload length.
    pub async fn preallocate(&self) -> Result<(), StorageError> {
        let mut guard = self.handle.lock().await;
        let file = match guard.take() {
            Some(file) => guard.insert(file),
            None => guard.insert(self.open().await?),
        };
        file.set_len(self.layout.total_length).await?;
        Ok(())
    }

    pub async fn write_piece(&self, piece_index: u32, data: &[u8]) -> Result<(), StorageError> {
        let range = self.layout.piece_range(piece_index)?;
        if data.len() as u64 != range.end - range.start {
            return Err(StorageError::InvalidLength {
                piece: piece_index,
                expected: range.end - range.start,
                actual: data.len() as u64,
            });
        }
        self.write_at(range.start, data).await
    }

    pub async fn read_piece(&self, piece_index: u32) -> Result<Bytes, StorageError> {
        let range = self.layout.piece_range(piece_index)?;
        self.read_range(range).await
    }

    pub async fn read_block(
        &self,
        piece_index: u32,
        offset: u32,
        length: u32,
    ) -> Result<Bytes, StorageError> {
        let range = self.layout.block_range(piece_index, offset, length)?;
        self.read_range(range).await
    }

    async fn write_at(&self, position: u64, data: &[u8]) -> Result<(), StorageError> {
        let mut guard = self.handle.lock().await;
        let file = match guard.take() {
            Some(file) => guard.insert(file),
            None => guard.insert(self.open().await?),
        };
        file.seek(SeekFrom::Start(position)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Bytes, StorageError> {
        let mut guard = self.handle.lock().await;
        let file = match guard.take() {
            Some(file) => guard.insert(file),
            None => guard.insert(self.open().await?),
        };

        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Flushes buffered writes and syncs file data to disk.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let mut guard = self.handle.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush().await?;
            file.sync_data().await?;
        }
        Ok(())
    }
}
