//! Peer wire protocol: handshake, message codec, and per-peer session state
//! machine.
use thiserror::Error;

pub mod handshake;
pub mod io;
pub mod session;
pub mod wire;

pub use handshake::Handshake;
pub use session::PeerSession;
pub use wire::PeerMessage;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting on peer")]
    Timeout,

    #[error("invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("info hash mismatch: peer advertised a different torrent")]
    InfoHashMismatch,

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("peer closed the connection")]
    ConnectionClosed,

    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
