use super::connector::{BoxedStream, Connector};
use super::error::ManagerError;
use crate::constants::{
    HANDSHAKE_TIMEOUT, MAX_PEERS, MAX_REQUEST_LENGTH, MIN_REQUEST_INTERVAL, REREQUEST_WINDOW,
    TICK_INTERVAL,
};
use crate::metainfo::{InfoHash, TorrentMeta};
use crate::peer::{Inbound, Message, PeerError, PeerId, PeerSession};
use crate::piece::{BlockOutcome, BlockRequest, PieceStore};
use crate::tracker::Tracker;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Identity of a live peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub info_hash: InfoHash,
    pub ip: IpAddr,
    pub port: u16,
}

impl PeerKey {
    pub fn new(info_hash: InfoHash, addr: SocketAddr) -> Self {
        Self {
            info_hash,
            ip: addr.ip(),
            port: addr.port(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Tuning knobs for a [`CommunicationManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub max_peers: usize,
    pub handshake_timeout: Duration,
    pub min_request_interval: Duration,
    pub rerequest_window: Duration,
    pub tick_interval: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            min_request_interval: MIN_REQUEST_INTERVAL,
            rerequest_window: REREQUEST_WINDOW,
            tick_interval: TICK_INTERVAL,
        }
    }
}

/// Owns every live peer session of one torrent and routes traffic between
/// them and the piece store.
///
/// All mutation of the peer set happens from `&mut self` methods, so one
/// owner drives the manager one tick at a time.
pub struct CommunicationManager {
    info_hash: InfoHash,
    our_id: PeerId,
    store: Arc<PieceStore>,
    connector: Arc<dyn Connector>,
    peers: HashMap<PeerKey, PeerSession<BoxedStream>>,
    last_requested: HashMap<u32, Instant>,
    settings: ManagerSettings,
    span: Span,
}

impl CommunicationManager {
    pub fn new(store: Arc<PieceStore>, connector: Arc<dyn Connector>) -> Self {
        let info_hash = store.info_hash();
        Self {
            info_hash,
            our_id: PeerId::generate(),
            store,
            connector,
            peers: HashMap::new(),
            last_requested: HashMap::new(),
            settings: ManagerSettings::default(),
            span: tracing::info_span!("manager", %info_hash),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.our_id = peer_id;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.our_id
    }

    pub fn store(&self) -> &Arc<PieceStore> {
        &self.store
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn contains(&self, key: &PeerKey) -> bool {
        self.peers.contains_key(key)
    }

    pub fn peer_keys(&self) -> Vec<PeerKey> {
        self.peers.keys().copied().collect()
    }

    pub fn peer(&self, key: &PeerKey) -> Option<&PeerSession<BoxedStream>> {
        self.peers.get(key)
    }

    /// Asks the tracker for candidates and connects to each new one until
    /// the peer cap is reached. Returns how many sessions were added.
    ///
    /// A candidate that fails to connect or handshake is dropped and not
    /// retried within this call.
    pub async fn bootstrap(
        &mut self,
        tracker: &dyn Tracker,
        meta: &TorrentMeta,
    ) -> Result<usize, ManagerError> {
        let candidates = tracker.get_peers(meta).await?;
        tracing::debug!(parent: &self.span, "tracker returned {} candidates", candidates.len());

        let mut added = 0;
        for addr in candidates {
            if self.peers.len() >= self.settings.max_peers {
                break;
            }
            if self.peers.contains_key(&PeerKey::new(self.info_hash, addr)) {
                continue;
            }
            match self.add_peer(addr).await {
                Ok(_) => added += 1,
                Err(e) => tracing::debug!(parent: &self.span, "failed to add {}: {}", addr, e),
            }
        }
        Ok(added)
    }

    /// Connects to `addr`, completes the handshake and adds the session.
    pub async fn add_peer(&mut self, addr: SocketAddr) -> Result<PeerKey, ManagerError> {
        let key = PeerKey::new(self.info_hash, addr);
        if self.peers.contains_key(&key) {
            return Err(ManagerError::DuplicatePeer(addr));
        }
        if self.peers.len() >= self.settings.max_peers {
            return Err(ManagerError::PeerLimitReached(self.settings.max_peers));
        }

        let stream = self.connector.connect(addr).await?;
        let mut session = PeerSession::connect(
            stream,
            addr,
            *self.info_hash.as_bytes(),
            self.our_id,
            self.store.piece_count(),
            self.settings.handshake_timeout,
        )
        .await?
        .with_min_request_interval(self.settings.min_request_interval)
        .with_span(tracing::debug_span!(parent: &self.span, "peer", %addr));

        if self.store.completed_count() > 0 {
            session
                .send(Message::Bitfield(self.store.bitfield().to_bytes()))
                .await?;
        }

        tracing::info!(parent: &self.span, "connected to {}", addr);
        self.peers.insert(key, session);
        Ok(key)
    }

    /// Closes and forgets a session. Returns false if it was not present.
    pub async fn remove_peer(&mut self, key: &PeerKey) -> bool {
        match self.peers.remove(key) {
            Some(mut session) => {
                session.close().await;
                tracing::debug!(parent: &self.span, "removed peer {}", key.addr());
                true
            }
            None => false,
        }
    }

    /// One scheduler step: reclaim stale requests, take whatever every peer
    /// has already sent and dispatch it.
    ///
    /// Reads never wait, so a quiet peer costs nothing and the step finishes
    /// well inside one tick interval. A peer that fails is evicted; the
    /// others are unaffected.
    pub async fn tick(&mut self) {
        self.store.sweep_pending();

        let reads: Vec<_> = self
            .peers
            .iter_mut()
            .map(|(key, session)| (*key, session.drain()))
            .collect();

        let mut failed = Vec::new();
        let mut completed = Vec::new();
        for (key, read) in reads {
            let result = match read {
                Ok(_) => self.process_peer(&key, &mut completed).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = result {
                failed.push((key, e));
            }
        }

        for (key, e) in failed {
            tracing::debug!(parent: &self.span, "evicting {}: {}", key.addr(), e);
            self.remove_peer(&key).await;
        }

        for piece in completed {
            self.last_requested.remove(&piece);
            self.broadcast_have(piece).await;
        }
    }

    async fn process_peer(
        &mut self,
        key: &PeerKey,
        completed: &mut Vec<u32>,
    ) -> Result<(), ManagerError> {
        let span = &self.span;
        let Some(session) = self.peers.get_mut(key) else {
            return Ok(());
        };

        for message in session.pull_messages()? {
            match session.handle(message).await? {
                Some(Inbound::Block {
                    piece,
                    offset,
                    data,
                }) => match self.store.set_block(piece, offset, data).await {
                    Ok(BlockOutcome::Completed) => completed.push(piece),
                    Ok(_) => {}
                    Err(e) => tracing::debug!(
                        parent: span,
                        "dropping block {}:{} from {}: {}",
                        piece,
                        offset,
                        key.addr(),
                        e
                    ),
                },
                Some(Inbound::Request(request)) => {
                    serve_request(&self.store, session, request).await?;
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn broadcast_have(&mut self, piece: u32) {
        let mut failed = Vec::new();
        for (key, session) in self.peers.iter_mut() {
            if session.bitfield.has_piece(piece as usize) {
                continue;
            }
            if let Err(e) = session.send(Message::Have { piece }).await {
                failed.push((*key, e));
            }
        }
        for (key, e) in failed {
            tracing::debug!(parent: &self.span, "evicting {}: {}", key.addr(), e);
            self.remove_peer(&key).await;
        }
    }

    /// Picks a random peer that may be asked for a block of `piece`.
    pub fn select_peer_for_block(&self, piece: u32) -> Option<PeerKey> {
        let candidates: Vec<&PeerKey> = self
            .peers
            .iter()
            .filter(|(_, session)| session.can_serve(piece))
            .map(|(key, _)| key)
            .collect();
        candidates.choose(&mut rand::rng()).map(|key| **key)
    }

    /// Requests every Free block of `piece`, one peer chosen per block.
    ///
    /// Returns the number of requests sent. A piece whose blocks were all
    /// dispatched is not requested again within the re-request window.
    pub async fn request_piece(&mut self, piece: u32) -> Result<usize, ManagerError> {
        if self.store.is_piece_complete(piece) {
            self.last_requested.remove(&piece);
            return Ok(0);
        }

        let now = Instant::now();
        if let Some(at) = self.last_requested.get(&piece) {
            if now.saturating_duration_since(*at) < self.settings.rerequest_window {
                return Ok(0);
            }
        }

        let requests = self.store.free_blocks(piece);
        let mut sent = 0;
        for request in requests {
            let key = self
                .select_peer_for_block(piece)
                .ok_or(ManagerError::NoEligiblePeer {
                    piece,
                    offset: request.offset,
                })?;

            let Some(session) = self.peers.get_mut(&key) else {
                continue;
            };
            if let Err(e) = session
                .request_block(request.piece, request.offset, request.length)
                .await
            {
                self.remove_peer(&key).await;
                return Err(e.into());
            }
            self.store.mark_pending(&request);
            sent += 1;
        }

        if sent > 0 {
            self.last_requested.insert(piece, now);
        }
        Ok(sent)
    }

    /// Ticks until `cancel` fires, then closes every session.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        for (_, mut session) in self.peers.drain() {
            session.close().await;
        }
    }
}

async fn serve_request(
    store: &PieceStore,
    session: &mut PeerSession<BoxedStream>,
    request: BlockRequest,
) -> Result<(), PeerError> {
    if request.length == 0
        || request.length > MAX_REQUEST_LENGTH
        || !store.is_piece_complete(request.piece)
    {
        tracing::trace!("not serving request for piece {}", request.piece);
        return Ok(());
    }

    let data = match store
        .read_block(request.piece, request.offset, request.length)
        .await
    {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("failed to read block for {:?}: {}", request, e);
            return Ok(());
        }
    };

    session
        .send(Message::Piece {
            index: request.piece,
            begin: request.offset,
            data,
        })
        .await
}
