use crate::metainfo::InfoHash;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NdnError {
    #[error("invalid content name: {0}")]
    InvalidName(String),

    #[error("torrent {0} is already registered")]
    AlreadyRegistered(InfoHash),

    #[error("torrent {0} is not registered")]
    NotRegistered(InfoHash),

    #[error("face error: {0}")]
    Face(String),

    #[error("face closed")]
    Closed,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
