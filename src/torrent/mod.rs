//! Torrent metainfo parsing, magnet link parsing, and their shared error type.
use thiserror::Error;

pub mod file;
pub mod info_hash;
pub mod magnet;

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid torrent file format: {0}")]
    InvalidFormat(String),

    #[error("missing or invalid field: {0}")]
    MissingField(String),

    #[error("invalid pieces hash length (must be a multiple of 20)")]
    InvalidPiecesHashLength,

    #[error("invalid creation date")]
    DateParseError,

    #[error("url parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("not a valid magnet link: {0}")]
    InvalidMagnetLink(String),
}

/// Result type for torrent/magnet operations.
pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
