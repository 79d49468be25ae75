use super::error::MetainfoError;
use super::info_hash::{hex_decode, InfoHash};
use crate::storage::ContentLayout;
use serde::Deserialize;
use std::path::Path;

/// An already-parsed torrent metadata record.
///
/// Only the fields the exchange engine consumes are kept: the info hash,
/// the piece geometry of the single contiguous payload and one SHA-1 digest
/// per piece.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawMeta")]
pub struct TorrentMeta {
    pub info_hash: InfoHash,
    pub name: Option<String>,
    pub piece_length: u64,
    pub length: u64,
    pub pieces: Vec<[u8; 20]>,
}

#[derive(Deserialize)]
struct RawMeta {
    info_hash: String,
    #[serde(default)]
    name: Option<String>,
    piece_length: u64,
    length: u64,
    pieces: Vec<String>,
}

impl TryFrom<RawMeta> for TorrentMeta {
    type Error = MetainfoError;

    fn try_from(raw: RawMeta) -> Result<Self, Self::Error> {
        let pieces = raw
            .pieces
            .iter()
            .map(|hex| {
                hex_decode(hex)
                    .and_then(|bytes| <[u8; 20]>::try_from(bytes.as_slice()).ok())
                    .ok_or(MetainfoError::InvalidField("pieces"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        TorrentMeta::new(
            InfoHash::from_hex(&raw.info_hash)?,
            raw.piece_length,
            raw.length,
            pieces,
        )
        .map(|meta| meta.with_name(raw.name))
    }
}

impl TorrentMeta {
    pub fn new(
        info_hash: InfoHash,
        piece_length: u64,
        length: u64,
        pieces: Vec<[u8; 20]>,
    ) -> Result<Self, MetainfoError> {
        if piece_length == 0 || piece_length > u32::MAX as u64 {
            return Err(MetainfoError::InvalidField("piece_length"));
        }

        let expected = length.div_ceil(piece_length) as usize;
        if pieces.len() != expected {
            return Err(MetainfoError::PieceCountMismatch {
                expected,
                found: pieces.len(),
            });
        }

        Ok(Self {
            info_hash,
            name: None,
            piece_length,
            length,
            pieces,
        })
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn from_json(data: &str) -> Result<Self, MetainfoError> {
        Ok(serde_json::from_str(data)?)
    }

    pub async fn load(path: &Path) -> Result<Self, MetainfoError> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_json(&data)
    }

    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    pub fn layout(&self) -> ContentLayout {
        ContentLayout::new(self.piece_length, self.length)
    }
}
