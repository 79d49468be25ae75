use super::bitfield::Bitfield;
use super::error::PeerError;
use super::framing::FrameReader;
use super::message::{Handshake, Message};
use super::peer_id::PeerId;
use crate::constants::{MAX_READ_PER_TICK, MIN_REQUEST_INTERVAL, PEER_WRITE_TIMEOUT, READ_CHUNK};
use crate::piece::BlockRequest;
use bytes::Bytes;
use futures::FutureExt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::Span;

/// The four protocol flags of one side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokingState {
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

impl Default for ChokingState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

/// Something a session hands up to its owner after handling a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Block payload for the piece store.
    Block { piece: u32, offset: u32, data: Bytes },
    /// A request the peer is currently allowed to make.
    Request(BlockRequest),
}

/// One connection to a remote peer.
///
/// The session owns the stream, the partial-frame accumulator and the
/// protocol state. It never touches piece data itself: payloads and
/// serviceable requests are returned as [`Inbound`] values for the
/// communication manager to route.
///
/// # Examples
///
/// ```no_run
/// use cefbit::peer::{PeerSession, PeerId};
/// use std::time::Duration;
/// use tokio::net::TcpStream;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let addr = "192.168.1.100:6881".parse()?;
/// let stream = TcpStream::connect(addr).await?;
/// let mut session = PeerSession::connect(
///     stream,
///     addr,
///     [0u8; 20],
///     PeerId::generate(),
///     128,
///     Duration::from_secs(5),
/// )
/// .await?;
///
/// session.fill(Duration::from_secs(5)).await?;
/// for message in session.pull_messages()? {
///     session.handle(message).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct PeerSession<S> {
    /// The peer's socket address.
    pub addr: SocketAddr,
    /// Info hash this session exchanges pieces for.
    pub info_hash: [u8; 20],
    /// The peer's ID, once its handshake arrived.
    pub remote_id: Option<[u8; 20]>,
    /// Choke/interest flags for both directions.
    pub choking: ChokingState,
    /// Pieces the peer announced.
    pub bitfield: Bitfield,
    /// Cleared when the session hits an unrecoverable error.
    pub healthy: bool,
    /// When the last bytes were received.
    pub last_activity: Instant,
    handshake_complete: bool,
    last_request_at: Option<Instant>,
    min_request_interval: Duration,
    reader: FrameReader,
    stream: Option<S>,
    span: Span,
}

impl<S> PeerSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps a freshly opened stream. No bytes are exchanged yet.
    pub fn new(stream: S, addr: SocketAddr, info_hash: [u8; 20], piece_count: usize) -> Self {
        Self {
            addr,
            info_hash,
            remote_id: None,
            choking: ChokingState::default(),
            bitfield: Bitfield::new(piece_count),
            healthy: true,
            last_activity: Instant::now(),
            handshake_complete: false,
            last_request_at: None,
            min_request_interval: MIN_REQUEST_INTERVAL,
            reader: FrameReader::new(),
            stream: Some(stream),
            span: tracing::debug_span!("peer", %addr),
        }
    }

    /// Sends our handshake and waits for a matching one from the peer.
    ///
    /// Bytes that arrive right behind the peer's handshake stay buffered for
    /// the next [`PeerSession::pull_messages`].
    pub async fn connect(
        stream: S,
        addr: SocketAddr,
        info_hash: [u8; 20],
        our_id: PeerId,
        piece_count: usize,
        handshake_timeout: Duration,
    ) -> Result<Self, PeerError> {
        let mut session = Self::new(stream, addr, info_hash, piece_count);
        session
            .send(Message::Handshake(Handshake::new(info_hash, *our_id.as_bytes())))
            .await?;

        timeout(handshake_timeout, session.await_handshake())
            .await
            .map_err(|_| PeerError::HandshakeFailed("timed out".into()))??;

        tracing::debug!(parent: &session.span, "handshake complete");
        Ok(session)
    }

    async fn await_handshake(&mut self) -> Result<(), PeerError> {
        while !self.handshake_complete {
            if let Some(message) = self.reader.next_frame()? {
                self.handle(message).await?;
                continue;
            }
            let stream = self.stream.as_mut().ok_or(PeerError::ConnectionClosed)?;
            let n = stream.read_buf(self.reader.buffer_mut()).await?;
            if n == 0 {
                return Err(PeerError::ConnectionClosed);
            }
            self.last_activity = Instant::now();
        }
        Ok(())
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    pub fn is_connected(&self) -> bool {
        self.healthy && self.stream.is_some()
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.reader.buffered()
    }

    pub async fn send(&mut self, message: Message) -> Result<(), PeerError> {
        let stream = self.stream.as_mut().ok_or(PeerError::ConnectionClosed)?;
        let data = message.encode();
        timeout(PEER_WRITE_TIMEOUT, stream.write_all(&data))
            .await
            .map_err(|_| PeerError::Timeout)??;
        Ok(())
    }

    /// Waits up to `read_timeout` for the peer to send something, then takes
    /// everything else that is already waiting in the socket.
    ///
    /// A read that does not complete within `read_timeout` is abandoned and
    /// reported as `Ok(0)`. End of stream is [`PeerError::ConnectionClosed`].
    pub async fn fill(&mut self, read_timeout: Duration) -> Result<usize, PeerError> {
        let stream = self.stream.as_mut().ok_or(PeerError::ConnectionClosed)?;
        let buf = self.reader.buffer_mut();
        buf.reserve(READ_CHUNK);
        let read = timeout(read_timeout, stream.read_buf(buf)).await;
        match read {
            Err(_) => Ok(0),
            Ok(Ok(0)) => Err(PeerError::ConnectionClosed),
            Ok(Ok(n)) => self.read_ready(n),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Takes every byte the peer has already sent without waiting for more.
    ///
    /// Returns `Ok(0)` when nothing is ready. End of stream is only reported
    /// once the bytes in front of it have been handed out.
    pub fn drain(&mut self) -> Result<usize, PeerError> {
        self.read_ready(0)
    }

    fn read_ready(&mut self, mut total: usize) -> Result<usize, PeerError> {
        let stream = self.stream.as_mut().ok_or(PeerError::ConnectionClosed)?;
        while total < MAX_READ_PER_TICK {
            let buf = self.reader.buffer_mut();
            buf.reserve(READ_CHUNK);
            match stream.read_buf(buf).now_or_never() {
                None => break,
                Some(Ok(0)) if total == 0 => return Err(PeerError::ConnectionClosed),
                Some(Ok(0)) => break,
                Some(Ok(n)) => total += n,
                Some(Err(e)) if total == 0 => return Err(e.into()),
                Some(Err(_)) => break,
            }
        }
        if total > 0 {
            self.last_activity = Instant::now();
        }
        Ok(total)
    }

    /// Frames every complete message currently buffered.
    ///
    /// Each call starts from the current buffer and returns a finite list;
    /// partial frames remain buffered.
    pub fn pull_messages(&mut self) -> Result<Vec<Message>, PeerError> {
        let _enter = self.span.enter();
        self.reader.pull()
    }

    /// Applies one received message to the session state.
    pub async fn handle(&mut self, message: Message) -> Result<Option<Inbound>, PeerError> {
        if !self.handshake_complete {
            return match message {
                Message::Handshake(handshake) => {
                    self.accept_handshake(&handshake)?;
                    Ok(None)
                }
                other => Err(PeerError::HandshakeFailed(format!(
                    "{:?} before handshake",
                    other.id()
                ))),
            };
        }

        match message {
            Message::Handshake(_) => {
                return Err(PeerError::HandshakeFailed("second handshake".into()));
            }
            Message::KeepAlive => {}
            Message::Choke => self.choking.peer_choking = true,
            Message::Unchoke => self.choking.peer_choking = false,
            Message::Interested => {
                self.choking.peer_interested = true;
                if self.choking.am_choking {
                    self.send(Message::Unchoke).await?;
                    self.choking.am_choking = false;
                }
            }
            Message::NotInterested => self.choking.peer_interested = false,
            Message::Have { piece } => {
                self.bitfield.set_piece(piece as usize);
                self.announce_interest().await?;
            }
            Message::Bitfield(bits) => {
                self.bitfield = Bitfield::from_bytes(&bits, self.bitfield.piece_count());
                self.announce_interest().await?;
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                if self.choking.peer_interested && !self.choking.peer_choking {
                    return Ok(Some(Inbound::Request(BlockRequest::new(index, begin, length))));
                }
                tracing::trace!(parent: &self.span, "ignoring request for piece {}", index);
            }
            Message::Piece { index, begin, data } => {
                return Ok(Some(Inbound::Block {
                    piece: index,
                    offset: begin,
                    data,
                }));
            }
            Message::Cancel { .. } | Message::Port(_) => {}
        }

        Ok(None)
    }

    fn accept_handshake(&mut self, handshake: &Handshake) -> Result<(), PeerError> {
        if handshake.info_hash != self.info_hash {
            return Err(PeerError::InfoHashMismatch);
        }
        self.remote_id = Some(handshake.peer_id);
        self.handshake_complete = true;
        self.reader.skip_handshake();
        Ok(())
    }

    async fn announce_interest(&mut self) -> Result<(), PeerError> {
        if self.choking.peer_choking && !self.choking.am_interested {
            self.send(Message::Interested).await?;
            self.choking.am_interested = true;
        }
        Ok(())
    }

    /// Sends a `Request` for one block and restarts the rate-limit clock.
    pub async fn request_block(
        &mut self,
        piece: u32,
        offset: u32,
        length: u32,
    ) -> Result<(), PeerError> {
        self.send(Message::Request {
            index: piece,
            begin: offset,
            length,
        })
        .await?;
        self.last_request_at = Some(Instant::now());
        Ok(())
    }

    /// Returns false while the minimum inter-request interval is running.
    pub fn is_eligible(&self) -> bool {
        self.is_eligible_at(Instant::now())
    }

    pub fn is_eligible_at(&self, now: Instant) -> bool {
        match self.last_request_at {
            Some(at) => now.saturating_duration_since(at) >= self.min_request_interval,
            None => true,
        }
    }

    /// True if a block of `piece` may be requested from this peer right now.
    pub fn can_serve(&self, piece: u32) -> bool {
        self.is_connected()
            && self.handshake_complete
            && self.is_eligible()
            && !self.choking.peer_choking
            && self.choking.am_interested
            && self.bitfield.has_piece(piece as usize)
    }

    /// Releases the connection. Any later I/O fails with `ConnectionClosed`.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.healthy = false;
    }
}
