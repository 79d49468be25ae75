use super::error::EngineError;
use super::EngineMode;
use crate::manager::{CommunicationManager, Connector, ManagerSettings};
use crate::metainfo::TorrentMeta;
use crate::peer::PeerId;
use crate::piece::{PieceEvent, PieceStore};
use crate::tracker::Tracker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Progress notifications published by a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    PieceCompleted { index: u32 },
    PieceRejected { index: u32 },
    /// Every piece validated.
    Finished,
    /// Cancelled before completion.
    Stopped,
}

/// Downloads one torrent by driving a [`CommunicationManager`] over all of
/// its pieces.
pub struct TorrentEngine {
    meta: Arc<TorrentMeta>,
    store: Arc<PieceStore>,
    manager: CommunicationManager,
    tracker: Arc<dyn Tracker>,
    mode: EngineMode,
    piece_events: mpsc::UnboundedReceiver<PieceEvent>,
    span: Span,
}

impl TorrentEngine {
    pub fn new(
        meta: TorrentMeta,
        store: PieceStore,
        connector: Arc<dyn Connector>,
        tracker: Arc<dyn Tracker>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("engine", info_hash = %meta.info_hash);
        let store = Arc::new(store.with_events(tx));
        let manager = CommunicationManager::new(store.clone(), connector)
            .with_span(tracing::info_span!(parent: &span, "manager"));

        Self {
            meta: Arc::new(meta),
            store,
            manager,
            tracker,
            mode: EngineMode::default(),
            piece_events: rx,
            span,
        }
    }

    pub fn with_mode(mut self, mode: EngineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.manager = self.manager.with_settings(settings);
        self
    }

    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.manager = self.manager.with_peer_id(peer_id);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn meta(&self) -> &Arc<TorrentMeta> {
        &self.meta
    }

    pub fn store(&self) -> &Arc<PieceStore> {
        &self.store
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Starts the download on a background task.
    pub fn spawn(self) -> Result<EngineHandle, EngineError> {
        if self.mode != EngineMode::Exchange {
            return Err(EngineError::UnsupportedMode(self.mode));
        }

        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let store = self.store.clone();
        let span = self.span.clone();
        let task = tokio::spawn(self.run(cancel.clone(), events_tx).instrument(span));

        Ok(EngineHandle {
            store,
            events: events_rx,
            cancel,
            task,
        })
    }

    async fn run(
        mut self,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<(), EngineError> {
        self.store.open().await?;
        self.store.verify_existing().await?;
        self.bootstrap().await;

        let mut ticker = tokio::time::interval(self.manager.settings().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            self.forward_events(&events);
            if self.store.is_complete() {
                break EngineEvent::Finished;
            }

            tokio::select! {
                _ = cancel.cancelled() => break EngineEvent::Stopped,
                _ = ticker.tick() => {}
            }

            self.manager.tick().await;
            if self.manager.peer_count() == 0 {
                self.bootstrap().await;
            }

            for piece in self.store.incomplete_pieces() {
                if let Err(e) = self.manager.request_piece(piece).await {
                    tracing::debug!("piece {} not scheduled: {}", piece, e);
                }
            }
        };

        self.manager.shutdown().await;
        self.store.flush().await?;
        self.forward_events(&events);

        match outcome {
            EngineEvent::Finished => tracing::info!("download complete"),
            _ => tracing::info!(
                "stopped at {}/{} pieces",
                self.store.completed_count(),
                self.store.piece_count()
            ),
        }
        let _ = events.send(outcome);
        Ok(())
    }

    async fn bootstrap(&mut self) {
        match self
            .manager
            .bootstrap(self.tracker.as_ref(), &self.meta)
            .await
        {
            Ok(added) => tracing::debug!("bootstrap added {} peers", added),
            Err(e) => tracing::warn!("bootstrap failed: {}", e),
        }
    }

    fn forward_events(&mut self, events: &mpsc::UnboundedSender<EngineEvent>) {
        while let Ok(event) = self.piece_events.try_recv() {
            let event = match event {
                PieceEvent::Completed { index } => EngineEvent::PieceCompleted { index },
                PieceEvent::Rejected { index } => EngineEvent::PieceRejected { index },
            };
            let _ = events.send(event);
        }
    }
}

/// Control side of a spawned [`TorrentEngine`].
pub struct EngineHandle {
    store: Arc<PieceStore>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), EngineError>>,
}

impl EngineHandle {
    pub fn store(&self) -> &Arc<PieceStore> {
        &self.store
    }

    pub fn progress(&self) -> f64 {
        self.store.progress()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Asks the engine to stop at the next tick boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events.recv().await
    }

    /// Waits for the engine task to finish.
    pub async fn join(self) -> Result<(), EngineError> {
        self.task
            .await
            .map_err(|e| EngineError::Task(e.to_string()))?
    }
}
