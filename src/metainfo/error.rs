use thiserror::Error;

/// Errors that can occur when loading a torrent metadata record.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The record is not valid JSON or is missing fields.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field has an invalid value.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// The info hash is not 20 bytes of hex.
    #[error("invalid info hash")]
    InvalidInfoHash,

    /// The number of piece hashes disagrees with `length / piece_length`.
    #[error("expected {expected} piece hashes, found {found}")]
    PieceCountMismatch { expected: usize, found: usize },

    /// An I/O error occurred while reading the record.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
