//! Disk storage for torrent payloads.
//!
//! A torrent is stored as one contiguous file; piece `i` lives at byte
//! offset `i * piece_length`. [`ContentLayout`] holds that geometry and
//! [`TorrentStorage`] performs the reads and writes.
//!
//! # Examples
//!
//! ```no_run
//! use cefbit::storage::{ContentLayout, TorrentStorage};
//! use std::path::PathBuf;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ContentLayout::new(512, 1500);
//! let storage = TorrentStorage::new(PathBuf::from("./downloads/content"), layout);
//! storage.preallocate().await?;
//!
//! storage.write_piece(0, &vec![0u8; 512]).await?;
//! let data = storage.read_piece(0).await?;
//! assert_eq!(data.len(), 512);
//! # Ok(())
//! # }
//! ```

mod error;
mod file;
mod manager;

pub use error::StorageError;
pub use file::ContentLayout;
pub use manager::TorrentStorage;
