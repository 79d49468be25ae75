use super::error::NdnError;
use crate::constants::NDN_PREFIX;
use crate::metainfo::InfoHash;
use std::fmt;
use std::str::FromStr;

/// Name of one piece on the named-data network:
/// `<prefix>/<info_hash hex>/<piece_index>`, with `ccnx:/BitTorrent` as the
/// default prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentName {
    pub info_hash: InfoHash,
    pub piece: u32,
}

impl ContentName {
    pub fn new(info_hash: InfoHash, piece: u32) -> Self {
        Self { info_hash, piece }
    }

    /// Parses a name under the default `ccnx:/BitTorrent` prefix.
    pub fn parse(name: &str) -> Result<Self, NdnError> {
        Self::parse_under(NDN_PREFIX, name)
    }

    /// Parses a name that must start with `prefix`.
    pub fn parse_under(prefix: &str, name: &str) -> Result<Self, NdnError> {
        let invalid = || NdnError::InvalidName(name.to_string());

        let rest = name
            .strip_prefix(prefix.trim_end_matches('/'))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (hash, piece) = rest.split_once('/').ok_or_else(invalid)?;

        let info_hash = InfoHash::from_hex(hash).map_err(|_| invalid())?;
        let piece = piece.parse().map_err(|_| invalid())?;
        Ok(Self { info_hash, piece })
    }

    /// Formats the name under `prefix`.
    pub fn to_name_under(&self, prefix: &str) -> String {
        format!(
            "{}/{}/{}",
            prefix.trim_end_matches('/'),
            self.info_hash.to_hex(),
            self.piece
        )
    }
}

impl fmt::Display for ContentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_name_under(NDN_PREFIX))
    }
}

impl FromStr for ContentName {
    type Err = NdnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
