use super::error::NdnError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Interest,
    Data,
}

/// A packet received from the named-data daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub name: String,
    pub chunk: u32,
    pub payload: Bytes,
}

impl Packet {
    pub fn interest(name: impl Into<String>, chunk: u32) -> Self {
        Self {
            kind: PacketKind::Interest,
            name: name.into(),
            chunk,
            payload: Bytes::new(),
        }
    }

    pub fn data(name: impl Into<String>, payload: Bytes) -> Self {
        Self {
            kind: PacketKind::Data,
            name: name.into(),
            chunk: 0,
            payload,
        }
    }

    pub fn is_interest(&self) -> bool {
        self.kind == PacketKind::Interest
    }

    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }
}

/// Connection to a named-data forwarding daemon.
#[async_trait]
pub trait NamedDataFace: Send + Sync {
    /// Announces that interests under `prefix` should be delivered here.
    async fn register(&self, prefix: &str) -> Result<(), NdnError>;

    async fn send_interest(&self, name: &str, chunk: u32) -> Result<(), NdnError>;

    async fn send_data(&self, name: &str, payload: Bytes) -> Result<(), NdnError>;

    /// Waits up to `timeout` for the next packet. `Ok(None)` means nothing
    /// arrived in time.
    async fn receive(&self, timeout: Duration) -> Result<Option<Packet>, NdnError>;
}

/// One end of an in-process link. Whatever one end sends, the other
/// receives.
pub struct MemoryFace {
    tx: mpsc::UnboundedSender<Packet>,
    rx: TokioMutex<mpsc::UnboundedReceiver<Packet>>,
}

impl MemoryFace {
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: a_tx,
                rx: TokioMutex::new(b_rx),
            },
            Self {
                tx: b_tx,
                rx: TokioMutex::new(a_rx),
            },
        )
    }

    fn push(&self, packet: Packet) -> Result<(), NdnError> {
        self.tx.send(packet).map_err(|_| NdnError::Closed)
    }
}

#[async_trait]
impl NamedDataFace for MemoryFace {
    async fn register(&self, _prefix: &str) -> Result<(), NdnError> {
        Ok(())
    }

    async fn send_interest(&self, name: &str, chunk: u32) -> Result<(), NdnError> {
        self.push(Packet::interest(name, chunk))
    }

    async fn send_data(&self, name: &str, payload: Bytes) -> Result<(), NdnError> {
        self.push(Packet::data(name, payload))
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Packet>, NdnError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(packet)) => Ok(Some(packet)),
            Ok(None) => Err(NdnError::Closed),
        }
    }
}
