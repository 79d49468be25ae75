use bytes::Bytes;
use cefbit::engine::{EngineEvent, TorrentEngine};
use cefbit::manager::{ManagerSettings, TcpConnector};
use cefbit::metainfo::{InfoHash, TorrentMeta};
use cefbit::peer::{Bitfield, FrameReader, Handshake, Message};
use cefbit::piece::PieceStore;
use cefbit::tracker::StaticTracker;
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const PIECE_LENGTH: usize = 32 * 1024;

fn payload() -> Vec<u8> {
    (0..PIECE_LENGTH * 3 + 1000)
        .map(|i| (i * 31 % 251) as u8)
        .collect()
}

fn meta_for(payload: &[u8]) -> TorrentMeta {
    let pieces = payload
        .chunks(PIECE_LENGTH)
        .map(|chunk| Sha1::digest(chunk).into())
        .collect();
    TorrentMeta::new(
        InfoHash([0x42; 20]),
        PIECE_LENGTH as u64,
        payload.len() as u64,
        pieces,
    )
    .unwrap()
    .with_name(Some("loopback.bin".into()))
}

/// Serves `payload` to every connection: announces all pieces, unchokes on
/// interest and answers each request with the requested bytes.
async fn spawn_seeder(payload: Arc<Vec<u8>>, meta: &TorrentMeta) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = *meta.info_hash.as_bytes();
    let piece_count = meta.piece_count();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, payload.clone(), info_hash, piece_count));
        }
    });
    addr
}

async fn serve(mut stream: TcpStream, payload: Arc<Vec<u8>>, info_hash: [u8; 20], pieces: usize) {
    let mut reader = FrameReader::new();
    loop {
        if stream.read_buf(reader.buffer_mut()).await.unwrap_or(0) == 0 {
            return;
        }
        let Ok(messages) = reader.pull() else {
            return;
        };

        for message in messages {
            let replies = match message {
                Message::Handshake(handshake) => {
                    if handshake.info_hash != info_hash {
                        return;
                    }
                    vec![
                        Message::Handshake(Handshake::new(info_hash, *b"-SD0001-abcdefghijkl")),
                        Message::Bitfield(Bitfield::full(pieces).to_bytes()),
                    ]
                }
                Message::Interested => vec![Message::Unchoke],
                Message::Request {
                    index,
                    begin,
                    length,
                } => {
                    let start = index as usize * PIECE_LENGTH + begin as usize;
                    let end = start + length as usize;
                    vec![Message::Piece {
                        index,
                        begin,
                        data: Bytes::copy_from_slice(&payload[start..end]),
                    }]
                }
                _ => vec![],
            };
            for reply in replies {
                if stream.write_all(&reply.encode()).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn settings() -> ManagerSettings {
    ManagerSettings {
        tick_interval: Duration::from_millis(20),
        ..ManagerSettings::default()
    }
}

#[tokio::test]
async fn downloads_torrent_from_tcp_seeder() {
    let temp = TempDir::new().unwrap();
    let payload = Arc::new(payload());
    let meta = meta_for(&payload);
    let seeder = spawn_seeder(payload.clone(), &meta).await;

    let path = temp.path().join(meta.info_hash.to_hex());
    let store = PieceStore::new(&meta, path.clone());
    let engine = TorrentEngine::new(
        meta,
        store,
        Arc::new(TcpConnector::default()),
        Arc::new(StaticTracker::new(vec![seeder])),
    )
    .with_settings(settings());

    let mut handle = engine.spawn().unwrap();
    let mut completed = 0;
    let result = tokio::time::timeout(Duration::from_secs(20), async {
        while let Some(event) = handle.next_event().await {
            match event {
                EngineEvent::PieceCompleted { .. } => completed += 1,
                EngineEvent::Finished => return true,
                EngineEvent::PieceRejected { index } => panic!("piece {} rejected", index),
                EngineEvent::Stopped => return false,
            }
        }
        false
    })
    .await
    .unwrap();

    assert!(result);
    assert_eq!(completed, 4);
    handle.join().await.unwrap();
    assert_eq!(tokio::fs::read(&path).await.unwrap(), *payload);
}

#[tokio::test]
async fn stops_on_cancel_when_peer_unreachable() {
    let temp = TempDir::new().unwrap();
    let payload = payload();
    let meta = meta_for(&payload);

    // Bind and drop so the port is very likely closed.
    let closed = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let store = PieceStore::new(&meta, temp.path().join("payload"));
    let engine = TorrentEngine::new(
        meta,
        store,
        Arc::new(TcpConnector::new(Duration::from_millis(200))),
        Arc::new(StaticTracker::new(vec![closed])),
    )
    .with_settings(settings());

    let mut handle = engine.spawn().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match handle.next_event().await {
                Some(EngineEvent::Stopped) | None => return true,
                Some(_) => continue,
            }
        }
    })
    .await
    .unwrap();
    assert!(event);
    assert_eq!(handle.progress(), 0.0);
    handle.join().await.unwrap();
}
