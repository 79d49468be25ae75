use super::cubic::Cubic;
use super::error::NdnError;
use super::face::{NamedDataFace, Packet, PacketKind};
use super::name::ContentName;
use crate::constants::{INITIAL_RTT, INITIAL_SSTHRESH, NDN_PREFIX, NDN_RECEIVE_TIMEOUT};
use crate::metainfo::InfoHash;
use crate::piece::{BlockOutcome, PieceStore};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Span;

#[derive(Debug, Clone)]
pub struct NdnSettings {
    pub prefix: String,
    pub initial_rtt: Duration,
    pub initial_ssthresh: f64,
    pub receive_timeout: Duration,
}

impl Default for NdnSettings {
    fn default() -> Self {
        Self {
            prefix: NDN_PREFIX.to_string(),
            initial_rtt: INITIAL_RTT,
            initial_ssthresh: INITIAL_SSTHRESH,
            receive_timeout: NDN_RECEIVE_TIMEOUT,
        }
    }
}

struct TransportState {
    cubic: Cubic,
    queue: VecDeque<ContentName>,
    pending: HashMap<ContentName, Instant>,
}

/// Fetches and serves whole pieces over a named-data face.
///
/// Interests are queued and released once per tick, at most `floor(cwnd)`
/// at a time. An interest left unanswered for more than twice the RTT
/// estimate is a congestion signal and is queued again.
pub struct NdnTransport {
    face: Arc<dyn NamedDataFace>,
    state: Mutex<TransportState>,
    stores: RwLock<HashMap<InfoHash, Arc<PieceStore>>>,
    settings: NdnSettings,
    span: Span,
}

impl NdnTransport {
    pub fn new(face: Arc<dyn NamedDataFace>) -> Self {
        Self::with_settings(face, NdnSettings::default())
    }

    pub fn with_settings(face: Arc<dyn NamedDataFace>, settings: NdnSettings) -> Self {
        let cubic = Cubic::new()
            .with_ssthresh(settings.initial_ssthresh)
            .with_rtt(settings.initial_rtt);
        Self {
            face,
            state: Mutex::new(TransportState {
                cubic,
                queue: VecDeque::new(),
                pending: HashMap::new(),
            }),
            stores: RwLock::new(HashMap::new()),
            settings,
            span: tracing::info_span!("ndn"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Registers our name prefix with the daemon.
    pub async fn setup(&self) -> Result<(), NdnError> {
        self.face.register(&self.settings.prefix).await
    }

    /// Makes a torrent's pieces fetchable and servable through this transport.
    pub fn register(&self, store: Arc<PieceStore>) -> Result<(), NdnError> {
        let info_hash = store.info_hash();
        let mut stores = self.stores.write();
        if stores.contains_key(&info_hash) {
            return Err(NdnError::AlreadyRegistered(info_hash));
        }
        stores.insert(info_hash, store);
        tracing::debug!(parent: &self.span, "registered {}", info_hash);
        Ok(())
    }

    pub fn unregister(&self, info_hash: &InfoHash) -> bool {
        self.stores.write().remove(info_hash).is_some()
    }

    fn store(&self, info_hash: &InfoHash) -> Option<Arc<PieceStore>> {
        self.stores.read().get(info_hash).cloned()
    }

    /// Queues an interest unless the same name is already queued or pending.
    pub fn enqueue(&self, name: ContentName) {
        let mut state = self.state.lock();
        if !state.pending.contains_key(&name) && !state.queue.contains(&name) {
            state.queue.push_back(name);
        }
    }

    /// Queues an interest for every incomplete piece of a registered torrent.
    pub fn request_missing(&self, info_hash: &InfoHash) -> Result<usize, NdnError> {
        let store = self
            .store(info_hash)
            .ok_or(NdnError::NotRegistered(*info_hash))?;
        let missing = store.incomplete_pieces();
        for &piece in &missing {
            self.enqueue(ContentName::new(*info_hash, piece));
        }
        Ok(missing.len())
    }

    pub fn congestion(&self) -> Cubic {
        self.state.lock().cubic.clone()
    }

    pub fn rtt(&self) -> Duration {
        self.state.lock().cubic.rtt()
    }

    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn wire_name(&self, name: &ContentName) -> String {
        name.to_name_under(&self.settings.prefix)
    }

    /// One sender step: grow the window, send up to `floor(cwnd)` queued
    /// interests, then expire overdue ones. Returns the number sent.
    pub async fn send_tick(&self) -> Result<usize, NdnError> {
        let batch: Vec<ContentName> = {
            let mut state = self.state.lock();
            state.cubic.update();
            let window = state.cubic.window();
            let take = window.min(state.queue.len());
            state.queue.drain(..take).collect()
        };

        let mut sent = 0;
        for (i, name) in batch.iter().enumerate() {
            if let Err(e) = self.face.send_interest(&self.wire_name(name), 0).await {
                let mut state = self.state.lock();
                for name in batch[i..].iter().rev() {
                    state.queue.push_front(*name);
                }
                return Err(e);
            }
            self.state.lock().pending.insert(*name, Instant::now());
            sent += 1;
        }

        self.expire_pending(Instant::now());
        Ok(sent)
    }

    fn expire_pending(&self, now: Instant) {
        let mut state = self.state.lock();
        let expired: Vec<ContentName> = state
            .pending
            .iter()
            .filter(|(_, sent_at)| state.cubic.is_timed_out(now.saturating_duration_since(**sent_at)))
            .map(|(name, _)| *name)
            .collect();

        for name in expired {
            state.pending.remove(&name);
            state.cubic.on_congestion_at(now);
            tracing::debug!(parent: &self.span, "interest for {} timed out", name);
            if !state.queue.contains(&name) {
                state.queue.push_back(name);
            }
        }
    }

    /// One listener step. Returns true if a packet was handled.
    ///
    /// Receive failures other than a closed face count as congestion.
    pub async fn receive_once(&self) -> Result<bool, NdnError> {
        let packet = match self.face.receive(self.settings.receive_timeout).await {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(false),
            Err(NdnError::Closed) => return Err(NdnError::Closed),
            Err(e) => {
                tracing::warn!(parent: &self.span, "receive failed: {}", e);
                self.state.lock().cubic.on_congestion();
                return Ok(false);
            }
        };

        match packet.kind {
            PacketKind::Interest => self.handle_interest(&packet).await?,
            PacketKind::Data => self.handle_data(packet).await,
        }
        Ok(true)
    }

    async fn handle_interest(&self, packet: &Packet) -> Result<(), NdnError> {
        let Ok(name) = ContentName::parse_under(&self.settings.prefix, &packet.name) else {
            tracing::trace!(parent: &self.span, "ignoring interest for {}", packet.name);
            return Ok(());
        };
        let Some(store) = self.store(&name.info_hash) else {
            return Ok(());
        };
        if !store.is_piece_complete(name.piece) {
            return Ok(());
        }

        let data = store.get_data(name.piece).await?;
        self.face.send_data(&packet.name, data).await
    }

    async fn handle_data(&self, packet: Packet) {
        let Ok(name) = ContentName::parse_under(&self.settings.prefix, &packet.name) else {
            tracing::trace!(parent: &self.span, "ignoring data for {}", packet.name);
            return;
        };

        {
            let mut state = self.state.lock();
            if let Some(sent_at) = state.pending.remove(&name) {
                state.cubic.on_rtt_sample(sent_at.elapsed());
            }
        }

        let Some(store) = self.store(&name.info_hash) else {
            return;
        };
        match store.set_piece(name.piece, packet.payload).await {
            Ok(BlockOutcome::Rejected) => self.enqueue(name),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(parent: &self.span, "dropping data for {}: {}", name, e);
                self.enqueue(name);
            }
        }
    }

    /// Runs the sender and listener loops until `cancel` fires or the face
    /// closes. The sender ticks once per RTT estimate.
    pub async fn run(&self, cancel: CancellationToken) {
        let sender = async {
            loop {
                let pause = self.rtt().max(Duration::from_millis(1));
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
                if let Err(e) = self.send_tick().await {
                    tracing::warn!(parent: &self.span, "send failed: {}", e);
                    if matches!(e, NdnError::Closed) {
                        break;
                    }
                }
            }
        };

        let listener = async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = self.receive_once() => match result {
                        Err(NdnError::Closed) => {
                            cancel.cancel();
                            break;
                        }
                        Err(e) => tracing::warn!(parent: &self.span, "receive failed: {}", e),
                        Ok(_) => {}
                    },
                }
            }
        };

        tokio::join!(sender, listener);
    }
}
