//! Tracker client logic for the BitTorrent protocol.
//!
//! This module implements communication with BitTorrent trackers, including:
//! - Announce requests and responses
//! - Peer parsing (compact and non-compact)
//! - Peer ID generation and URL encoding helpers
//!
//! Used by the client to discover peers for a torrent.
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use rand::Rng;
use thiserror::Error;

use crate::bencode::{self, BencodeError, BencodeValue};
use crate::torrent::file::TorrentFile;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request to tracker failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed tracker URL: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("tracker response is not valid bencode: {0}")]
    Bencode(#[from] BencodeError),

    #[error("tracker response is missing field: {0}")]
    MissingField(String),

    #[error("tracker rejected the announce: {0}")]
    Failure(String),

    #[error("malformed peer list: {0}")]
    InvalidPeerList(String),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Represents a client communicating with a BitTorrent tracker.
#[derive(Debug)]
pub struct Client {
    peer_id: [u8; 20],
    port: u16,
}

/// Contains the parameters for a tracker announce request.
#[derive(Debug)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: i64,
    pub downloaded: i64,
    pub compact: bool,
    pub left: i64,
}

/// A peer received from the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub ip: IpAddr,
    pub port: u16,
}

/// The parsed response from a tracker.
#[derive(Debug, PartialEq)]
pub struct AnnounceResponse {
    pub interval: i64,
    /// The full set of peers the tracker returned. An earlier draft of this
    /// client only kept the first entry from the list; that was a bug, not
    /// a deliberate sampling policy, and every peer is kept here.
    pub peers: Vec<Peer>,
}

impl Client {
    pub fn new(port: u16) -> Self {
        Self {
            peer_id: generate_peer_id(),
            port,
        }
    }

    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Sends an announce request to the tracker to get a list of peers.
    #[tracing::instrument(skip(self, torrent), level = "debug")]
    pub async fn announce(&self, torrent: &TorrentFile) -> TrackerResult<AnnounceResponse> {
        let request = AnnounceRequest {
            info_hash: torrent.info_hash,
            peer_id: self.peer_id,
            port: self.port,
            uploaded: 0,
            downloaded: 0,
            compact: true,
            left: torrent.length,
        };

        let mut url = url::Url::parse(&torrent.announce)?;
        let params = [
            ("info_hash", url_encode(&request.info_hash)),
            ("peer_id", url_encode(&request.peer_id)),
            ("port", request.port.to_string()),
            ("uploaded", request.uploaded.to_string()),
            ("downloaded", request.downloaded.to_string()),
            ("left", request.left.to_string()),
            ("compact", (request.compact as i32).to_string()),
        ];
        url.query_pairs_mut().extend_pairs(&params).finish();
        tracing::debug!(%url, "making announce request to tracker");

        let response = reqwest::get(url).await?;
        let response_bytes = response.bytes().await?;
        Self::parse_announce_response(&response_bytes)
    }

    /// Parses the bencoded response body from a tracker announce request.
    ///
    /// Handles both peer list encodings specified by the protocol:
    /// - **Compact**: `peers` is a byte string, 6 bytes per peer (4-byte
    ///   IPv4 address, 2-byte port, both network byte order).
    /// - **Non-compact**: `peers` is a list of dictionaries with `ip` and
    ///   `port` keys.
    fn parse_announce_response(bytes: &[u8]) -> TrackerResult<AnnounceResponse> {
        let value = bencode::decode_all(bytes)?;
        let mut dict = match value {
            BencodeValue::Dict(d) => d,
            _ => {
                return Err(TrackerError::InvalidPeerList(
                    "tracker response root is not a dictionary".to_string(),
                ))
            }
        };

        if let Some(BencodeValue::String(reason)) = dict.remove(b"failure reason".as_slice()) {
            let reason = String::from_utf8_lossy(&reason).into_owned();
            return Err(TrackerError::Failure(reason));
        }

        let interval = match dict.remove(b"interval".as_slice()) {
            Some(BencodeValue::Integer(n)) => n,
            _ => 0,
        };

        let peers = match dict.remove(b"peers".as_slice()) {
            Some(BencodeValue::String(compact)) => parse_compact_peers(&compact)?,
            Some(BencodeValue::List(dicts)) => parse_noncompact_peers(dicts)?,
            Some(_) => {
                return Err(TrackerError::InvalidPeerList(
                    "peers field has unexpected type".to_string(),
                ))
            }
            None => Vec::new(),
        };

        Ok(AnnounceResponse { interval, peers })
    }
}

fn parse_compact_peers(bytes: &[u8]) -> TrackerResult<Vec<Peer>> {
    if bytes.len() % 6 != 0 {
        return Err(TrackerError::InvalidPeerList(
            "compact peers field length is not a multiple of 6".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            Peer {
                ip: IpAddr::V4(ip),
                port,
            }
        })
        .collect())
}

fn parse_noncompact_peers(dicts: Vec<BencodeValue>) -> TrackerResult<Vec<Peer>> {
    let mut peers = Vec::with_capacity(dicts.len());
    for entry in dicts {
        let mut dict: HashMap<Vec<u8>, BencodeValue> = match entry {
            BencodeValue::Dict(d) => d,
            _ => {
                return Err(TrackerError::InvalidPeerList(
                    "non-compact peer entry is not a dictionary".to_string(),
                ))
            }
        };
        let ip = match dict.remove(b"ip".as_slice()) {
            Some(BencodeValue::String(s)) => String::from_utf8_lossy(&s).into_owned(),
            _ => return Err(TrackerError::MissingField("ip".to_string())),
        };
        let port = match dict.remove(b"port".as_slice()) {
            Some(BencodeValue::Integer(n)) => n as u16,
            _ => return Err(TrackerError::MissingField("port".to_string())),
        };
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| TrackerError::InvalidPeerList(format!("unparseable peer ip: {ip}")))?;
        peers.push(Peer { ip, port });
    }
    Ok(peers)
}

/// Generates a unique peer ID for this client.
///
/// A 20-byte peer ID: a 9-byte Azureus-style prefix ("-RT0001-", RT for
/// "Rust torrent") followed by 11 random bytes for uniqueness.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

/// URL-encodes a byte slice per RFC 3986, leaving unreserved characters
/// (`a-z`, `A-Z`, `0-9`, `-`, `.`, `_`, `~`) untouched.
fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_has_azureus_prefix() {
        let id = generate_peer_id();
        assert_eq!(&id[..8], b"-RT0001-");
        assert_eq!(id.len(), 20);
    }

    #[test]
    fn url_encode_escapes_reserved_bytes() {
        assert_eq!(url_encode(b"Hello World!"), "Hello%20World%21");
        assert_eq!(url_encode(b"abc-._~"), "abc-._~");
    }

    #[test]
    fn parses_compact_peer_list() {
        let mut body = HashMap::new();
        body.insert(b"interval".to_vec(), BencodeValue::Integer(1800));
        let mut compact = Vec::new();
        compact.extend_from_slice(&[127, 0, 0, 1]);
        compact.extend_from_slice(&6881u16.to_be_bytes());
        body.insert(b"peers".to_vec(), BencodeValue::String(compact));
        let bytes = bencode::encode(&BencodeValue::Dict(body));

        let response = Client::parse_announce_response(&bytes).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].port, 6881);
        assert_eq!(response.peers[0].ip, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn parses_multiple_compact_peers_not_just_the_first() {
        let mut body = HashMap::new();
        body.insert(b"interval".to_vec(), BencodeValue::Integer(900));
        let mut compact = Vec::new();
        for i in 1..=3u8 {
            compact.extend_from_slice(&[10, 0, 0, i]);
            compact.extend_from_slice(&(6880u16 + i as u16).to_be_bytes());
        }
        body.insert(b"peers".to_vec(), BencodeValue::String(compact));
        let bytes = bencode::encode(&BencodeValue::Dict(body));

        let response = Client::parse_announce_response(&bytes).unwrap();
        assert_eq!(response.peers.len(), 3);
    }

    #[test]
    fn parses_noncompact_peer_list() {
        let mut peer_dict = HashMap::new();
        peer_dict.insert(b"ip".to_vec(), BencodeValue::String(b"192.168.1.5".to_vec()));
        peer_dict.insert(b"port".to_vec(), BencodeValue::Integer(51413));

        let mut body = HashMap::new();
        body.insert(b"interval".to_vec(), BencodeValue::Integer(1800));
        body.insert(
            b"peers".to_vec(),
            BencodeValue::List(vec![BencodeValue::Dict(peer_dict)]),
        );
        let bytes = bencode::encode(&BencodeValue::Dict(body));

        let response = Client::parse_announce_response(&bytes).unwrap();
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].port, 51413);
    }

    #[test]
    fn failure_reason_surfaces_as_error() {
        let mut body = HashMap::new();
        body.insert(
            b"failure reason".to_vec(),
            BencodeValue::String(b"unregistered torrent".to_vec()),
        );
        let bytes = bencode::encode(&BencodeValue::Dict(body));
        let err = Client::parse_announce_response(&bytes).unwrap_err();
        assert!(matches!(err, TrackerError::Failure(_)));
    }
}
