use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("piece {0} is not complete")]
    PieceIncomplete(u32),

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("invalid block offset: piece {piece}, offset {offset}")]
    InvalidBlockOffset { piece: u32, offset: u32 },

    #[error("invalid length for piece {piece}: expected {expected}, got {actual}")]
    InvalidLength {
        piece: u32,
        expected: u64,
        actual: u64,
    },
}
