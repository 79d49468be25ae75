use thiserror::Error;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame whose declared length does not match its kind or its buffer.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A length prefix larger than any frame we are willing to buffer.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// A frame carrying a kind byte outside 0..=9.
    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    /// The peer sent something other than a valid handshake first.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,
}

impl PeerError {
    /// Returns true for errors that only affect one frame.
    ///
    /// Malformed frames are dropped and the session keeps going. Everything
    /// else ends the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PeerError::MalformedMessage(_) | PeerError::UnknownMessageId(_)
        )
    }

    /// Returns true for transport level failures (I/O, reset, close, timeout).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            PeerError::Io(_) | PeerError::ConnectionClosed | PeerError::Timeout
        )
    }
}
