use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracker returned error: {0}")]
    TrackerError(String),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("timeout")]
    Timeout,
}
