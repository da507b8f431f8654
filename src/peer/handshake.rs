//! The BitTorrent peer handshake.
//!
//! The handshake is the first message exchanged between two peers. It
//! verifies both peers are participating in the same torrent (via
//! `info_hash`) and establishes basic protocol compatibility, including
//! which BEP-10 extensions a peer supports via its reserved bytes.
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::instrument;

use super::{PeerError, PeerResult};

/// Bit in byte 5 of the reserved field that advertises BEP-10 extended
/// messaging support.
const EXTENSION_PROTOCOL_BIT: u8 = 0x10;

/// A BitTorrent handshake message.
///
/// Wire layout (68 bytes total):
/// - 1 byte: protocol string length (always 19)
/// - 19 bytes: protocol string (`"BitTorrent protocol"`)
/// - 8 bytes: reserved, used to advertise extensions
/// - 20 bytes: info hash
/// - 20 bytes: peer ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_len: u8,
    pub protocol: [u8; 19],
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Builds a handshake advertising BEP-10 extended-messaging support.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] = EXTENSION_PROTOCOL_BIT;
        Self {
            protocol_len: 19,
            protocol: *b"BitTorrent protocol",
            reserved,
            info_hash,
            peer_id,
        }
    }

    /// Whether this handshake's reserved bytes advertise the BEP-10
    /// extension protocol.
    pub fn supports_extensions(&self) -> bool {
        self.reserved[5] & EXTENSION_PROTOCOL_BIT != 0
    }

    /// Serializes the handshake into its 68-byte wire form.
    #[instrument(level = "trace")]
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = self.protocol_len;
        buf[1..20].copy_from_slice(&self.protocol);
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Reads exactly 68 bytes from `stream` and parses a handshake,
    /// validating the protocol length and string.
    #[instrument(level = "trace", skip(stream))]
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Self> {
        let mut length_buf = [0u8; 1];
        stream.read_exact(&mut length_buf).await?;
        let protocol_len = length_buf[0];
        if protocol_len != 19 {
            return Err(PeerError::InvalidProtocol(format!(
                "protocol length: {protocol_len}"
            )));
        }

        let mut buf = [0u8; 67];
        stream.read_exact(&mut buf).await?;

        let mut protocol = [0u8; 19];
        protocol.copy_from_slice(&buf[0..19]);
        if &protocol != b"BitTorrent protocol" {
            return Err(PeerError::InvalidProtocol(format!(
                "protocol string: {protocol:?}"
            )));
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[19..27]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[27..47]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[47..67]);

        Ok(Self {
            protocol_len,
            protocol,
            reserved,
            info_hash,
            peer_id,
        })
    }

    /// Writes this handshake to `stream`.
    #[instrument(level = "trace", skip(stream, self))]
    pub async fn write(&self, stream: &mut TcpStream) -> PeerResult<()> {
        stream.write_all(&self.serialize()).await?;
        Ok(())
    }

    /// Validates that this handshake's info hash matches `expected`.
    pub fn validate(&self, expected_info_hash: [u8; 20]) -> PeerResult<()> {
        if self.info_hash != expected_info_hash {
            return Err(PeerError::InfoHashMismatch);
        }
        Ok(())
    }

    /// Performs a complete handshake over a fresh TCP connection: connect,
    /// send our handshake, read and validate theirs.
    pub async fn do_handshake(
        peer_addr: std::net::SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<(TcpStream, Handshake)> {
        let mut stream = TcpStream::connect(peer_addr).await?;

        let ours = Handshake::new(info_hash, peer_id);
        ours.write(&mut stream).await?;

        let theirs = Handshake::read(&mut stream).await?;
        theirs.validate(info_hash)?;

        Ok((stream, theirs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_handshake() -> Handshake {
        Handshake::new([1u8; 20], [2u8; 20])
    }

    #[test]
    fn serialize_round_trips_fields() {
        let handshake = sample_handshake();
        let bytes = handshake.serialize();
        assert_eq!(bytes.len(), 68);
        assert_eq!(bytes[0], 19);
        assert_eq!(&bytes[1..20], b"BitTorrent protocol");
        assert_eq!(&bytes[28..48], &[1u8; 20][..]);
        assert_eq!(&bytes[48..68], &[2u8; 20][..]);
    }

    #[test]
    fn new_advertises_extension_support() {
        let handshake = sample_handshake();
        assert!(handshake.supports_extensions());
    }

    #[test]
    fn validate_rejects_mismatched_info_hash() {
        let handshake = sample_handshake();
        assert!(handshake.validate([9u8; 20]).is_err());
        assert!(handshake.validate([1u8; 20]).is_ok());
    }

    #[test]
    fn supports_extensions_is_false_without_the_bit() {
        let mut handshake = sample_handshake();
        handshake.reserved = [0u8; 8];
        assert!(!handshake.supports_extensions());
    }
}
