use super::error::PeerError;
use super::message::{Handshake, Message};
use crate::constants::{HANDSHAKE_LEN, LENGTH_PREFIX, MAX_MESSAGE_SIZE, PROTOCOL};
use bytes::BytesMut;

/// Reassembles wire messages from a byte stream that arrives in arbitrary
/// chunks.
///
/// Bytes are appended to an internal buffer; [`FrameReader::pull`] then
/// frames as many complete messages as possible from its front. Incomplete
/// frames stay buffered until more bytes arrive, so calling `pull` after
/// every read yields the same sequence no matter how the stream was split.
///
/// The first record on a connection is the fixed 68-byte handshake, which has
/// no length prefix, so it is checked for explicitly before generic framing.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    awaiting_handshake: bool,
}

impl FrameReader {
    /// Creates a reader that expects a handshake before anything else.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(32 * 1024),
            awaiting_handshake: true,
        }
    }

    /// Creates a reader for a stream whose handshake was already consumed.
    pub fn after_handshake() -> Self {
        Self {
            buf: BytesMut::with_capacity(32 * 1024),
            awaiting_handshake: false,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Direct access to the accumulator, for `read_buf` style I/O.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Number of bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn awaiting_handshake(&self) -> bool {
        self.awaiting_handshake
    }

    /// Switches to generic framing once the handshake was accepted elsewhere.
    pub fn skip_handshake(&mut self) {
        self.awaiting_handshake = false;
    }

    /// Frames one message from the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds only a partial frame. A frame
    /// that fails to decode is consumed before the error is returned, so the
    /// next call starts at the following frame.
    pub fn next_frame(&mut self) -> Result<Option<Message>, PeerError> {
        if self.awaiting_handshake {
            return self.next_handshake();
        }

        if self.buf.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let length =
            u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;

        if length == 0 {
            let _ = self.buf.split_to(LENGTH_PREFIX);
            return Ok(Some(Message::KeepAlive));
        }

        if length > MAX_MESSAGE_SIZE {
            return Err(PeerError::FrameTooLarge(length));
        }

        let total_len = LENGTH_PREFIX + length;
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let frame = self.buf.split_to(total_len);
        Message::decode(frame.freeze()).map(Some)
    }

    fn next_handshake(&mut self) -> Result<Option<Message>, PeerError> {
        // Reject a wrong protocol string as soon as its first byte is in.
        if let Some(&pstrlen) = self.buf.first() {
            if pstrlen as usize != PROTOCOL.len() {
                return Err(PeerError::HandshakeFailed(format!(
                    "protocol length {}",
                    pstrlen
                )));
            }
        }

        if self.buf.len() < HANDSHAKE_LEN {
            return Ok(None);
        }

        let raw = self.buf.split_to(HANDSHAKE_LEN);
        let handshake = Handshake::decode(&raw)?;
        self.awaiting_handshake = false;
        Ok(Some(Message::Handshake(handshake)))
    }

    /// Frames every complete message currently buffered.
    ///
    /// Malformed frames are logged and dropped. Errors that leave the stream
    /// unrecoverable (bad handshake, oversized frame) stop framing at the
    /// offending frame: messages framed before it are returned first and the
    /// error comes back from the next call, since the bad frame stays
    /// buffered.
    pub fn pull(&mut self) -> Result<Vec<Message>, PeerError> {
        let mut messages = Vec::new();

        loop {
            match self.next_frame() {
                Ok(Some(message)) => messages.push(message),
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("dropping malformed frame: {}", e);
                }
                Err(e) if messages.is_empty() => return Err(e),
                Err(e) => {
                    tracing::debug!("stopping at unframeable data: {}", e);
                    break;
                }
            }
        }

        Ok(messages)
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
