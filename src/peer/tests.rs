use super::*;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const INFO_HASH: [u8; 20] = [7u8; 20];

fn all_messages() -> Vec<Message> {
    vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0b1010_0000, 0xFF])),
        Message::Request {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(b"hello world"),
        },
        Message::Cancel {
            index: 1,
            begin: 0,
            length: 16384,
        },
        Message::Port(6881),
    ]
}

fn test_addr() -> SocketAddr {
    "127.0.0.1:6881".parse().unwrap()
}

async fn handshaken_session(piece_count: usize) -> (PeerSession<DuplexStream>, DuplexStream) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let mut session = PeerSession::new(local, test_addr(), INFO_HASH, piece_count);
    session
        .handle(Message::Handshake(Handshake::new(INFO_HASH, [2u8; 20])))
        .await
        .unwrap();
    (session, remote)
}

async fn read_message(remote: &mut DuplexStream) -> Message {
    let mut prefix = [0u8; 4];
    remote.read_exact(&mut prefix).await.unwrap();
    let length = u32::from_be_bytes(prefix) as usize;
    let mut frame = vec![0u8; 4 + length];
    frame[..4].copy_from_slice(&prefix);
    remote.read_exact(&mut frame[4..]).await.unwrap();
    Message::decode(Bytes::from(frame)).unwrap()
}

#[test]
fn test_peer_id_generate() {
    let id1 = PeerId::generate();
    let id2 = PeerId::generate();
    assert_ne!(id1.0, id2.0);
    assert_eq!(id1.client_id(), Some("CB0001"));
}

#[test]
fn test_bitfield() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has_piece(0));

    bf.set_piece(0);
    bf.set_piece(99);
    bf.set_piece(100);
    assert!(bf.has_piece(0));
    assert!(bf.has_piece(99));
    assert!(!bf.has_piece(100));

    bf.clear_piece(0);
    assert_eq!(bf.count(), 1);
}

#[test]
fn test_bitfield_from_bytes_clears_spare_bits() {
    let bf = Bitfield::from_bytes(&[0xFF], 3);
    assert_eq!(bf.as_bytes(), &[0b1110_0000]);
    assert!(bf.is_complete());

    let short = Bitfield::from_bytes(&[], 10);
    assert_eq!(short.as_bytes().len(), 2);
    assert_eq!(short.count(), 0);
}

#[test]
fn test_handshake_layout() {
    let handshake = Handshake::new([1u8; 20], [2u8; 20]);
    let encoded = handshake.encode();

    assert_eq!(encoded.len(), 68);
    assert_eq!(encoded[0], 19);
    assert_eq!(&encoded[1..20], b"BitTorrent protocol");
    assert_eq!(&encoded[20..28], &[0u8; 8]);
    assert_eq!(&encoded[28..48], &[1u8; 20]);
    assert_eq!(&encoded[48..68], &[2u8; 20]);

    assert_eq!(Handshake::decode(&encoded).unwrap(), handshake);
}

#[test]
fn test_handshake_rejects_wrong_protocol() {
    let mut encoded = Handshake::new([1u8; 20], [2u8; 20]).encode().to_vec();
    encoded[5] = b'x';
    assert!(matches!(
        Handshake::decode(&encoded),
        Err(PeerError::HandshakeFailed(_))
    ));
    assert!(Handshake::decode(&encoded[..40]).is_err());
}

#[test]
fn test_message_round_trip() {
    for msg in all_messages() {
        let decoded = Message::decode(msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }
}

#[test]
fn test_wire_layout() {
    assert_eq!(Message::KeepAlive.encode().as_ref(), &[0, 0, 0, 0]);
    assert_eq!(Message::Choke.encode().as_ref(), &[0, 0, 0, 1, 0]);
    assert_eq!(
        Message::Have { piece: 258 }.encode().as_ref(),
        &[0, 0, 0, 5, 4, 0, 0, 1, 2]
    );
    assert_eq!(
        Message::Port(6881).encode().as_ref(),
        &[0, 0, 0, 5, 9, 0, 0, 0x1A, 0xE1]
    );

    let piece = Message::Piece {
        index: 1,
        begin: 2,
        data: Bytes::from_static(b"abc"),
    }
    .encode();
    assert_eq!(&piece[..5], &[0, 0, 0, 12, 7]);
    assert_eq!(&piece[13..], b"abc");
}

#[test]
fn test_decode_accepts_two_byte_port() {
    let frame = Bytes::from_static(&[0, 0, 0, 3, 9, 0x1A, 0xE1]);
    assert_eq!(Message::decode(frame).unwrap(), Message::Port(6881));
}

#[test]
fn test_decode_unknown_kind() {
    let frame = Bytes::from_static(&[0, 0, 0, 1, 20]);
    assert!(matches!(
        Message::decode(frame),
        Err(PeerError::UnknownMessageId(20))
    ));
}

#[test]
fn test_decode_length_mismatch() {
    // Have declaring 5 bytes but only 4 follow.
    let short = Bytes::from_static(&[0, 0, 0, 5, 4, 0, 0, 1]);
    assert!(matches!(
        Message::decode(short),
        Err(PeerError::MalformedMessage(_))
    ));

    // Choke declaring a payload it must not have.
    let long = Bytes::from_static(&[0, 0, 0, 2, 0, 9]);
    assert!(matches!(
        Message::decode(long),
        Err(PeerError::MalformedMessage(_))
    ));

    // Piece without room for index and offset.
    let piece = Bytes::from_static(&[0, 0, 0, 5, 7, 0, 0, 0, 1]);
    assert!(Message::decode(piece).is_err());
}

#[test]
fn test_framing_split_at_every_boundary() {
    let mut stream = Handshake::new(INFO_HASH, [2u8; 20]).encode().to_vec();
    for msg in all_messages() {
        stream.extend_from_slice(&msg.encode());
    }

    let mut whole = FrameReader::new();
    whole.extend(&stream);
    let expected = whole.pull().unwrap();
    assert_eq!(expected.len(), 1 + all_messages().len());

    for split in 1..stream.len() {
        let mut reader = FrameReader::new();
        reader.extend(&stream[..split]);
        let mut got = reader.pull().unwrap();
        reader.extend(&stream[split..]);
        got.extend(reader.pull().unwrap());
        assert_eq!(got, expected, "split at {}", split);
        assert_eq!(reader.buffered(), 0);
    }
}

#[test]
fn test_framing_byte_by_byte() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&Message::Have { piece: 9 }.encode());
    stream.extend_from_slice(&Message::KeepAlive.encode());
    stream.extend_from_slice(&Message::Unchoke.encode());

    let mut reader = FrameReader::after_handshake();
    let mut got = Vec::new();
    for byte in &stream {
        reader.extend(std::slice::from_ref(byte));
        got.extend(reader.pull().unwrap());
    }

    assert_eq!(
        got,
        vec![Message::Have { piece: 9 }, Message::KeepAlive, Message::Unchoke]
    );
}

#[test]
fn test_framing_partial_frame_stays_buffered() {
    let encoded = Message::Request {
        index: 0,
        begin: 0,
        length: 16384,
    }
    .encode();

    let mut reader = FrameReader::after_handshake();
    reader.extend(&encoded[..10]);
    assert!(reader.pull().unwrap().is_empty());
    assert_eq!(reader.buffered(), 10);
}

#[test]
fn test_framing_drops_malformed_and_continues() {
    let mut reader = FrameReader::after_handshake();
    reader.extend(&[0, 0, 0, 1, 42]);
    reader.extend(&Message::Interested.encode());

    assert_eq!(reader.pull().unwrap(), vec![Message::Interested]);
}

#[test]
fn test_framing_rejects_bad_handshake() {
    let mut reader = FrameReader::new();
    reader.extend(&Message::Choke.encode());
    assert!(matches!(reader.pull(), Err(PeerError::HandshakeFailed(_))));
}

#[test]
fn test_framing_rejects_oversized_frame() {
    let mut reader = FrameReader::after_handshake();
    reader.extend(&u32::MAX.to_be_bytes());
    assert!(matches!(reader.pull(), Err(PeerError::FrameTooLarge(_))));
}

#[test]
fn test_framing_keeps_messages_before_oversized_frame() {
    let mut reader = FrameReader::after_handshake();
    reader.extend(&Message::Have { piece: 3 }.encode());
    reader.extend(&u32::MAX.to_be_bytes());

    assert_eq!(reader.pull().unwrap(), vec![Message::Have { piece: 3 }]);
    assert!(matches!(reader.pull(), Err(PeerError::FrameTooLarge(_))));
}

#[test]
fn test_framing_skip_handshake() {
    let mut reader = FrameReader::new();
    reader.skip_handshake();
    assert!(!reader.awaiting_handshake());

    reader.extend(&Message::Unchoke.encode());
    assert_eq!(reader.pull().unwrap(), vec![Message::Unchoke]);
}

#[test]
fn test_error_classification() {
    assert!(PeerError::MalformedMessage("x".into()).is_recoverable());
    assert!(PeerError::UnknownMessageId(99).is_recoverable());
    assert!(!PeerError::HandshakeFailed("x".into()).is_recoverable());
    assert!(PeerError::Timeout.is_connection_failure());
    assert!(PeerError::ConnectionClosed.is_connection_failure());
    assert!(!PeerError::InfoHashMismatch.is_connection_failure());
}

#[test]
fn test_choking_state_default() {
    let state = ChokingState::default();
    assert!(state.am_choking);
    assert!(!state.am_interested);
    assert!(state.peer_choking);
    assert!(!state.peer_interested);
}

#[tokio::test]
async fn test_connect_performs_handshake() {
    let (local, mut remote) = tokio::io::duplex(64 * 1024);

    let seeder = tokio::spawn(async move {
        let mut theirs = [0u8; 68];
        remote.read_exact(&mut theirs).await.unwrap();
        let received = Handshake::decode(&theirs).unwrap();
        assert_eq!(received.info_hash, INFO_HASH);

        remote
            .write_all(&Handshake::new(INFO_HASH, [9u8; 20]).encode())
            .await
            .unwrap();
        remote
            .write_all(&Message::Bitfield(Bytes::from_static(&[0x80])).encode())
            .await
            .unwrap();
        remote
    });

    let mut session = PeerSession::connect(
        local,
        test_addr(),
        INFO_HASH,
        PeerId::generate(),
        4,
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    let mut remote = seeder.await.unwrap();

    assert!(session.handshake_complete());
    assert_eq!(session.remote_id, Some([9u8; 20]));

    // Bitfield sent right behind the handshake is not lost.
    while session.buffered() < 6 {
        session.fill(Duration::from_secs(1)).await.unwrap();
    }
    let messages = session.pull_messages().unwrap();
    assert_eq!(messages, vec![Message::Bitfield(Bytes::from_static(&[0x80]))]);
    for message in messages {
        session.handle(message).await.unwrap();
    }
    assert!(session.bitfield.has_piece(0));
    assert_eq!(read_message(&mut remote).await, Message::Interested);
}

#[tokio::test]
async fn test_connect_rejects_wrong_info_hash() {
    let (local, mut remote) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        let mut theirs = [0u8; 68];
        remote.read_exact(&mut theirs).await.unwrap();
        remote
            .write_all(&Handshake::new([1u8; 20], [9u8; 20]).encode())
            .await
            .unwrap();
        remote
    });

    let result = PeerSession::connect(
        local,
        test_addr(),
        INFO_HASH,
        PeerId::generate(),
        4,
        Duration::from_secs(2),
    )
    .await;
    assert!(matches!(result, Err(PeerError::InfoHashMismatch)));
}

#[tokio::test]
async fn test_connect_times_out_without_handshake() {
    let (local, _remote) = tokio::io::duplex(64 * 1024);

    let result = PeerSession::connect(
        local,
        test_addr(),
        INFO_HASH,
        PeerId::generate(),
        4,
        Duration::from_millis(50),
    )
    .await;
    assert!(matches!(result, Err(PeerError::HandshakeFailed(_))));
}

#[tokio::test]
async fn test_message_before_handshake_fails() {
    let (local, _remote) = tokio::io::duplex(1024);
    let mut session = PeerSession::new(local, test_addr(), INFO_HASH, 4);

    let result = session.handle(Message::Unchoke).await;
    assert!(matches!(result, Err(PeerError::HandshakeFailed(_))));
}

#[tokio::test]
async fn test_choke_transitions() {
    let (mut session, _remote) = handshaken_session(4).await;

    session.handle(Message::Unchoke).await.unwrap();
    assert!(!session.choking.peer_choking);

    session.handle(Message::Choke).await.unwrap();
    assert!(session.choking.peer_choking);

    session.handle(Message::NotInterested).await.unwrap();
    assert!(!session.choking.peer_interested);
}

#[tokio::test]
async fn test_interested_triggers_unchoke() {
    let (mut session, mut remote) = handshaken_session(4).await;

    session.handle(Message::Interested).await.unwrap();
    assert!(session.choking.peer_interested);
    assert!(!session.choking.am_choking);
    assert_eq!(read_message(&mut remote).await, Message::Unchoke);
}

#[tokio::test]
async fn test_have_announces_interest_once() {
    let (mut session, mut remote) = handshaken_session(4).await;

    session.handle(Message::Have { piece: 2 }).await.unwrap();
    session.handle(Message::Have { piece: 3 }).await.unwrap();
    session.send(Message::KeepAlive).await.unwrap();

    assert!(session.bitfield.has_piece(2));
    assert!(session.bitfield.has_piece(3));
    assert!(session.choking.am_interested);
    assert_eq!(read_message(&mut remote).await, Message::Interested);
    assert_eq!(read_message(&mut remote).await, Message::KeepAlive);
}

#[tokio::test]
async fn test_bitfield_replaces_wholesale() {
    let (mut session, _remote) = handshaken_session(8).await;

    session.handle(Message::Have { piece: 7 }).await.unwrap();
    session
        .handle(Message::Bitfield(Bytes::from_static(&[0b1000_0000])))
        .await
        .unwrap();

    assert!(session.bitfield.has_piece(0));
    assert!(!session.bitfield.has_piece(7));
}

#[tokio::test]
async fn test_request_acceptance_predicate() {
    let (mut session, _remote) = handshaken_session(4).await;
    let request = Message::Request {
        index: 1,
        begin: 0,
        length: 16,
    };

    assert_eq!(session.handle(request.clone()).await.unwrap(), None);

    session.choking.peer_interested = true;
    session.choking.peer_choking = false;
    assert_eq!(
        session.handle(request).await.unwrap(),
        Some(Inbound::Request(crate::piece::BlockRequest::new(1, 0, 16)))
    );
}

#[tokio::test]
async fn test_piece_is_forwarded() {
    let (mut session, _remote) = handshaken_session(4).await;
    let data = Bytes::from_static(b"block");

    let inbound = session
        .handle(Message::Piece {
            index: 2,
            begin: 16,
            data: data.clone(),
        })
        .await
        .unwrap();

    assert_eq!(
        inbound,
        Some(Inbound::Block {
            piece: 2,
            offset: 16,
            data
        })
    );
}

#[tokio::test]
async fn test_cancel_and_port_are_noops() {
    let (mut session, _remote) = handshaken_session(4).await;
    let before = session.choking;

    let cancel = Message::Cancel {
        index: 0,
        begin: 0,
        length: 16,
    };
    assert_eq!(session.handle(cancel).await.unwrap(), None);
    assert_eq!(session.handle(Message::Port(6881)).await.unwrap(), None);
    assert_eq!(session.choking, before);
}

#[tokio::test]
async fn test_request_block_rate_limit() {
    let (session, mut remote) = handshaken_session(4).await;
    let mut session = session.with_min_request_interval(Duration::from_secs(60));

    assert!(session.is_eligible());
    session.request_block(1, 0, 16384).await.unwrap();
    assert!(!session.is_eligible());
    assert_eq!(
        read_message(&mut remote).await,
        Message::Request {
            index: 1,
            begin: 0,
            length: 16384
        }
    );
}

#[tokio::test]
async fn test_can_serve_requires_unchoke_interest_and_piece() {
    let (mut session, _remote) = handshaken_session(4).await;
    assert!(!session.can_serve(1));

    session.handle(Message::Have { piece: 1 }).await.unwrap();
    assert!(!session.can_serve(1));

    session.handle(Message::Unchoke).await.unwrap();
    assert!(session.can_serve(1));
    assert!(!session.can_serve(2));
}

#[tokio::test]
async fn test_fill_timeout_is_empty_read() {
    let (mut session, remote) = handshaken_session(4).await;

    assert_eq!(session.fill(Duration::from_millis(20)).await.unwrap(), 0);

    drop(remote);
    assert!(matches!(
        session.fill(Duration::from_millis(20)).await,
        Err(PeerError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_handled_handshake_switches_to_message_framing() {
    let (mut session, mut remote) = handshaken_session(4).await;
    remote
        .write_all(&Message::Have { piece: 2 }.encode())
        .await
        .unwrap();

    session.fill(Duration::from_secs(1)).await.unwrap();
    assert_eq!(
        session.pull_messages().unwrap(),
        vec![Message::Have { piece: 2 }]
    );
}

#[tokio::test]
async fn test_fill_takes_every_ready_frame() {
    let (mut session, mut remote) = handshaken_session(4).await;
    let frames: Vec<Message> = (0..3)
        .map(|i| Message::Piece {
            index: 1,
            begin: i * 16384,
            data: Bytes::from(vec![i as u8; 16384]),
        })
        .collect();
    for frame in &frames {
        remote.write_all(&frame.encode()).await.unwrap();
    }

    let read = session.fill(Duration::from_secs(1)).await.unwrap();
    assert_eq!(read, 3 * (4 + 9 + 16384));
    assert_eq!(session.pull_messages().unwrap(), frames);
    assert_eq!(session.buffered(), 0);
}

#[tokio::test]
async fn test_drain_does_not_wait() {
    let (mut session, mut remote) = handshaken_session(4).await;
    assert_eq!(session.drain().unwrap(), 0);

    remote.write_all(&Message::Choke.encode()).await.unwrap();
    drop(remote);

    // Bytes ahead of the close are handed out before the close is reported.
    assert_eq!(session.drain().unwrap(), 5);
    assert_eq!(session.pull_messages().unwrap(), vec![Message::Choke]);
    assert!(matches!(session.drain(), Err(PeerError::ConnectionClosed)));
}

#[tokio::test]
async fn test_close_releases_connection() {
    let (mut session, _remote) = handshaken_session(4).await;
    session.close().await;

    assert!(!session.is_connected());
    assert!(matches!(
        session.send(Message::KeepAlive).await,
        Err(PeerError::ConnectionClosed)
    ));
}
