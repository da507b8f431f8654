//! The post-handshake peer wire protocol: a length-prefixed stream of
//! typed messages.
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{PeerError, PeerResult};

/// Request/Cancel share this payload shape: a piece index, a byte offset
/// into that piece, and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPayload {
    pub index: u32,
    pub begin: u32,
    pub length: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiecePayload {
    pub index: u32,
    pub begin: u32,
    pub block: Vec<u8>,
}

/// A single peer wire protocol message, modeled as a tagged enum rather
/// than a class hierarchy — message kind and payload are inseparable, and
/// matching on `PeerMessage` exhaustively covers every case the protocol
/// defines.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request(RequestPayload),
    Piece(PiecePayload),
    Cancel(RequestPayload),
    /// A BEP-10 extended message: an extension message ID and its raw
    /// (still bencoded, for id 0) payload.
    Extended { id: u8, payload: Vec<u8> },
}

impl PeerMessage {
    fn message_id(&self) -> Option<u8> {
        match self {
            PeerMessage::KeepAlive => None,
            PeerMessage::Choke => Some(0),
            PeerMessage::Unchoke => Some(1),
            PeerMessage::Interested => Some(2),
            PeerMessage::NotInterested => Some(3),
            PeerMessage::Have(_) => Some(4),
            PeerMessage::Bitfield(_) => Some(5),
            PeerMessage::Request(_) => Some(6),
            PeerMessage::Piece(_) => Some(7),
            PeerMessage::Cancel(_) => Some(8),
            PeerMessage::Extended { .. } => Some(20),
        }
    }

    /// Encodes this message into its length-prefixed wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            PeerMessage::KeepAlive => buf.put_u32(0),
            PeerMessage::Choke
            | PeerMessage::Unchoke
            | PeerMessage::Interested
            | PeerMessage::NotInterested => {
                buf.put_u32(1);
                buf.put_u8(self.message_id().unwrap());
            }
            PeerMessage::Have(index) => {
                buf.put_u32(5);
                buf.put_u8(4);
                buf.put_u32(*index);
            }
            PeerMessage::Bitfield(bits) => {
                buf.put_u32(1 + bits.len() as u32);
                buf.put_u8(5);
                buf.put_slice(bits);
            }
            PeerMessage::Request(p) | PeerMessage::Cancel(p) => {
                buf.put_u32(13);
                buf.put_u8(self.message_id().unwrap());
                buf.put_u32(p.index);
                buf.put_u32(p.begin);
                buf.put_u32(p.length);
            }
            PeerMessage::Piece(p) => {
                buf.put_u32(9 + p.block.len() as u32);
                buf.put_u8(7);
                buf.put_u32(p.index);
                buf.put_u32(p.begin);
                buf.put_slice(&p.block);
            }
            PeerMessage::Extended { id, payload } => {
                buf.put_u32(2 + payload.len() as u32);
                buf.put_u8(20);
                buf.put_u8(*id);
                buf.put_slice(payload);
            }
        }
        buf.to_vec()
    }

    /// Reads one length-prefixed message from `reader`.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> PeerResult<PeerMessage> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await?;
        let len = BigEndian::read_u32(&len_buf);
        if len == 0 {
            return Ok(PeerMessage::KeepAlive);
        }
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;
        Self::decode_payload(&payload)
    }

    /// Writes this message to `writer`.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> PeerResult<()> {
        writer.write_all(&self.encode()).await?;
        Ok(())
    }

    fn decode_payload(payload: &[u8]) -> PeerResult<PeerMessage> {
        let &id = payload
            .first()
            .ok_or_else(|| PeerError::MalformedMessage("empty message body".to_string()))?;
        let rest = &payload[1..];
        match id {
            0 => Ok(PeerMessage::Choke),
            1 => Ok(PeerMessage::Unchoke),
            2 => Ok(PeerMessage::Interested),
            3 => Ok(PeerMessage::NotInterested),
            4 => {
                require_len(rest, 4, "have")?;
                Ok(PeerMessage::Have(BigEndian::read_u32(rest)))
            }
            5 => Ok(PeerMessage::Bitfield(rest.to_vec())),
            6 | 8 => {
                require_len(rest, 12, "request/cancel")?;
                let payload = RequestPayload {
                    index: BigEndian::read_u32(&rest[0..4]),
                    begin: BigEndian::read_u32(&rest[4..8]),
                    length: BigEndian::read_u32(&rest[8..12]),
                };
                if id == 6 {
                    Ok(PeerMessage::Request(payload))
                } else {
                    Ok(PeerMessage::Cancel(payload))
                }
            }
            7 => {
                if rest.len() < 8 {
                    return Err(PeerError::MalformedMessage("piece too short".to_string()));
                }
                Ok(PeerMessage::Piece(PiecePayload {
                    index: BigEndian::read_u32(&rest[0..4]),
                    begin: BigEndian::read_u32(&rest[4..8]),
                    block: rest[8..].to_vec(),
                }))
            }
            20 => {
                let &ext_id = rest.first().ok_or_else(|| {
                    PeerError::MalformedMessage("extended message missing id".to_string())
                })?;
                Ok(PeerMessage::Extended {
                    id: ext_id,
                    payload: rest[1..].to_vec(),
                })
            }
            other => Err(PeerError::MalformedMessage(format!(
                "unknown message id: {other}"
            ))),
        }
    }
}

fn require_len(bytes: &[u8], expected: usize, what: &str) -> PeerResult<()> {
    if bytes.len() != expected {
        return Err(PeerError::MalformedMessage(format!(
            "{what} payload must be {expected} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn round_trip(message: PeerMessage) {
        let bytes = message.encode();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = PeerMessage::read_from(&mut cursor).await.unwrap();
        assert_eq!(decoded, message);
    }

    #[tokio::test]
    async fn round_trips_fixed_length_messages() {
        round_trip(PeerMessage::KeepAlive).await;
        round_trip(PeerMessage::Choke).await;
        round_trip(PeerMessage::Unchoke).await;
        round_trip(PeerMessage::Interested).await;
        round_trip(PeerMessage::NotInterested).await;
        round_trip(PeerMessage::Have(42)).await;
    }

    #[tokio::test]
    async fn round_trips_variable_length_messages() {
        round_trip(PeerMessage::Bitfield(vec![0xff, 0x00, 0x1a])).await;
        round_trip(PeerMessage::Request(RequestPayload {
            index: 1,
            begin: 16384,
            length: 16384,
        }))
        .await;
        round_trip(PeerMessage::Cancel(RequestPayload {
            index: 1,
            begin: 0,
            length: 16384,
        }))
        .await;
        round_trip(PeerMessage::Piece(PiecePayload {
            index: 2,
            begin: 0,
            block: vec![1, 2, 3, 4],
        }))
        .await;
        round_trip(PeerMessage::Extended {
            id: 0,
            payload: b"d1:md11:ut_metadatai3eee".to_vec(),
        })
        .await;
    }

    #[tokio::test]
    async fn rejects_unknown_message_id() {
        let bytes = vec![0, 0, 0, 1, 99];
        let mut cursor = std::io::Cursor::new(bytes);
        let result = PeerMessage::read_from(&mut cursor).await;
        assert!(matches!(result, Err(PeerError::MalformedMessage(_))));
    }

    #[tokio::test]
    async fn rejects_malformed_have_length() {
        let bytes = vec![0, 0, 0, 2, 4, 0];
        let mut cursor = std::io::Cursor::new(bytes);
        let result = PeerMessage::read_from(&mut cursor).await;
        assert!(matches!(result, Err(PeerError::MalformedMessage(_))));
    }
}
