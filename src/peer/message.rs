use super::error::PeerError;
use crate::constants::{HANDSHAKE_LEN, LENGTH_PREFIX, PROTOCOL};
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            _ => Err(PeerError::UnknownMessageId(value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub reserved: [u8; 8],
}

impl Handshake {
    /// Creates a handshake with all reserved bits cleared; no extensions are
    /// advertised.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self {
            info_hash,
            peer_id,
            reserved: [0u8; 8],
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN {
            return Err(PeerError::HandshakeFailed(format!(
                "expected {} bytes, got {}",
                HANDSHAKE_LEN,
                data.len()
            )));
        }

        if data[0] as usize != PROTOCOL.len() || &data[1..20] != PROTOCOL {
            return Err(PeerError::HandshakeFailed("unknown protocol".into()));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);

        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            info_hash,
            peer_id,
            reserved,
        })
    }
}

/// A peer wire message.
///
/// `Handshake` and `KeepAlive` have fixed formats of their own. Every other
/// variant is framed as `u32 length | u8 kind | payload`, big-endian, where
/// `length` counts the kind byte plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake(Handshake),
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece: u32 },
    Bitfield(Bytes),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, data: Bytes },
    Cancel { index: u32, begin: u32, length: u32 },
    Port(u16),
}

impl Message {
    /// Returns the kind byte, or `None` for the two fixed-format records.
    pub fn id(&self) -> Option<MessageId> {
        match self {
            Message::Handshake(_) | Message::KeepAlive => None,
            Message::Choke => Some(MessageId::Choke),
            Message::Unchoke => Some(MessageId::Unchoke),
            Message::Interested => Some(MessageId::Interested),
            Message::NotInterested => Some(MessageId::NotInterested),
            Message::Have { .. } => Some(MessageId::Have),
            Message::Bitfield(_) => Some(MessageId::Bitfield),
            Message::Request { .. } => Some(MessageId::Request),
            Message::Piece { .. } => Some(MessageId::Piece),
            Message::Cancel { .. } => Some(MessageId::Cancel),
            Message::Port(_) => Some(MessageId::Port),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            Message::Handshake(handshake) => return handshake.encode(),
            Message::KeepAlive => {
                buf.put_u32(0);
            }
            Message::Choke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Choke as u8);
            }
            Message::Unchoke => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Unchoke as u8);
            }
            Message::Interested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::Interested as u8);
            }
            Message::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(MessageId::NotInterested as u8);
            }
            Message::Have { piece } => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Have as u8);
                buf.put_u32(*piece);
            }
            Message::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(MessageId::Bitfield as u8);
                buf.put_slice(bits);
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Request as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Piece { index, begin, data } => {
                buf.put_u32(9 + data.len() as u32);
                buf.put_u8(MessageId::Piece as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_slice(data);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                buf.put_u32(13);
                buf.put_u8(MessageId::Cancel as u8);
                buf.put_u32(*index);
                buf.put_u32(*begin);
                buf.put_u32(*length);
            }
            Message::Port(port) => {
                buf.put_u32(5);
                buf.put_u8(MessageId::Port as u8);
                buf.put_u32(u32::from(*port));
            }
        }

        buf.freeze()
    }

    /// Decodes exactly one length-prefixed frame.
    ///
    /// `data` must hold the 4-byte prefix and exactly as many bytes as the
    /// prefix declares. Handshakes are not accepted here; see
    /// [`Handshake::decode`].
    pub fn decode(mut data: Bytes) -> Result<Self, PeerError> {
        if data.len() < LENGTH_PREFIX {
            return Err(PeerError::MalformedMessage("too short".into()));
        }

        let length = data.get_u32() as usize;

        if data.remaining() != length {
            return Err(PeerError::MalformedMessage(format!(
                "declared length {} but {} bytes follow",
                length,
                data.remaining()
            )));
        }

        if length == 0 {
            return Ok(Message::KeepAlive);
        }

        let id = MessageId::try_from(data.get_u8())?;

        match id {
            MessageId::Choke => expect_len(id, length, 1).map(|_| Message::Choke),
            MessageId::Unchoke => expect_len(id, length, 1).map(|_| Message::Unchoke),
            MessageId::Interested => expect_len(id, length, 1).map(|_| Message::Interested),
            MessageId::NotInterested => {
                expect_len(id, length, 1).map(|_| Message::NotInterested)
            }
            MessageId::Have => {
                expect_len(id, length, 5)?;
                Ok(Message::Have {
                    piece: data.get_u32(),
                })
            }
            MessageId::Bitfield => Ok(Message::Bitfield(data.copy_to_bytes(length - 1))),
            MessageId::Request => {
                expect_len(id, length, 13)?;
                Ok(Message::Request {
                    index: data.get_u32(),
                    begin: data.get_u32(),
                    length: data.get_u32(),
                })
            }
            MessageId::Piece => {
                if length < 9 {
                    return Err(PeerError::MalformedMessage("piece too short".into()));
                }
                let index = data.get_u32();
                let begin = data.get_u32();
                let block_data = data.copy_to_bytes(length - 9);
                Ok(Message::Piece {
                    index,
                    begin,
                    data: block_data,
                })
            }
            MessageId::Cancel => {
                expect_len(id, length, 13)?;
                Ok(Message::Cancel {
                    index: data.get_u32(),
                    begin: data.get_u32(),
                    length: data.get_u32(),
                })
            }
            MessageId::Port => match length {
                // 2-byte form as sent by most clients
                3 => Ok(Message::Port(data.get_u16())),
                5 => {
                    let port = data.get_u32();
                    u16::try_from(port)
                        .map(Message::Port)
                        .map_err(|_| PeerError::MalformedMessage(format!("port {} out of range", port)))
                }
                _ => Err(PeerError::MalformedMessage(format!(
                    "port length {}",
                    length
                ))),
            },
        }
    }
}

fn expect_len(id: MessageId, actual: usize, expected: usize) -> Result<(), PeerError> {
    if actual != expected {
        return Err(PeerError::MalformedMessage(format!(
            "{:?} declared length {}, expected {}",
            id, actual, expected
        )));
    }
    Ok(())
}
