//! Single-file `.torrent` metainfo: parsing, piece/block geometry helpers.
use crate::bencode::{self, BencodeValue};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::info_hash;
use super::{TorrentError, TorrentResult};

/// The maximum size of a single REQUEST/PIECE block, per the wire protocol.
pub const BLOCK_SIZE: u32 = 16384;

/// Parsed `.torrent` metainfo for a single-file torrent.
///
/// Multi-file torrents (an `info` dict carrying `files` instead of
/// `length`) are out of scope — this type rejects them at parse time.
#[derive(Debug, PartialEq, Clone)]
pub struct TorrentFile {
    pub announce: String,
    pub announce_list: Vec<Vec<String>>,
    pub creation_date: Option<SystemTime>,
    pub comment: String,
    pub created_by: String,
    pub encoding: String,
    pub name: String,
    pub length: i64,
    pub piece_length: i64,
    pub piece_hashes: Vec<[u8; 20]>,
    pub info_hash: [u8; 20],
    /// BEP-27 private flag: `info.private == 1`. Not enforced anywhere in
    /// this client (no DHT/PEX in scope to suppress), but parsed and
    /// exposed so callers can at least observe it.
    pub private: bool,
}

impl TorrentFile {
    /// Parses the bencoded bytes of a `.torrent` file.
    pub fn from_bytes(raw: &[u8]) -> TorrentResult<TorrentFile> {
        let value = bencode::decode_all(raw)?;
        Self::from_value(value)
    }

    fn from_value(value: BencodeValue) -> TorrentResult<TorrentFile> {
        let mut dict = match value {
            BencodeValue::Dict(d) => d,
            _ => return Err(TorrentError::InvalidFormat("root is not a dictionary".into())),
        };

        let announce = take_string(&mut dict, "announce")?
            .ok_or_else(|| TorrentError::MissingField("announce".into()))?;

        let info_value = dict
            .remove(b"info".as_slice())
            .ok_or_else(|| TorrentError::MissingField("info".into()))?;
        let info_dict = match &info_value {
            BencodeValue::Dict(d) => d.clone(),
            _ => return Err(TorrentError::InvalidFormat("info is not a dict".into())),
        };

        let announce_list = match dict.remove(b"announce-list".as_slice()) {
            Some(value) => parse_announce_list(value)?,
            None => Vec::new(),
        };
        let creation_date = match dict.remove(b"creation date".as_slice()) {
            Some(BencodeValue::Integer(secs)) => {
                let secs: u64 = secs.try_into().map_err(|_| TorrentError::DateParseError)?;
                Some(UNIX_EPOCH + Duration::from_secs(secs))
            }
            Some(_) => return Err(TorrentError::InvalidFormat("creation date not an integer".into())),
            None => None,
        };
        let comment = take_string(&mut dict, "comment")?.unwrap_or_default();
        let created_by = take_string(&mut dict, "created by")?.unwrap_or_default();
        let encoding = take_string(&mut dict, "encoding")?.unwrap_or_default();

        let mut info = info_dict.clone();
        let name = take_string(&mut info, "name")?.unwrap_or_default();
        let piece_length = match info.remove(b"piece length".as_slice()) {
            Some(BencodeValue::Integer(n)) => n,
            _ => return Err(TorrentError::MissingField("piece length".into())),
        };
        if info.contains_key(b"files".as_slice()) {
            return Err(TorrentError::InvalidFormat(
                "multi-file torrents are not supported".into(),
            ));
        }
        let length = match info.remove(b"length".as_slice()) {
            Some(BencodeValue::Integer(n)) => n,
            _ => return Err(TorrentError::MissingField("length".into())),
        };
        let pieces_bytes = match info.remove(b"pieces".as_slice()) {
            Some(BencodeValue::String(s)) => s,
            _ => return Err(TorrentError::MissingField("pieces".into())),
        };
        let piece_hashes = parse_pieces(&pieces_bytes)?;
        let private = match info.remove(b"private".as_slice()) {
            Some(BencodeValue::Integer(n)) => n != 0,
            Some(_) => return Err(TorrentError::InvalidFormat("private is not an integer".into())),
            None => false,
        };
        let info_hash = info_hash::calculate_info_hash(&info_dict);

        Ok(TorrentFile {
            announce,
            announce_list,
            creation_date,
            comment,
            created_by,
            encoding,
            name,
            length,
            piece_length,
            piece_hashes,
            info_hash,
            private,
        })
    }

    pub fn num_pieces(&self) -> usize {
        self.piece_hashes.len()
    }

    /// Size in bytes of piece `index` — `piece_length` for every piece but
    /// the last, whose size is `length - piece_length * (num_pieces - 1)`.
    pub fn piece_size(&self, index: usize) -> i64 {
        if index >= self.num_pieces() {
            return 0;
        }
        if index < self.num_pieces() - 1 {
            self.piece_length
        } else {
            self.length - self.piece_length * (self.num_pieces() as i64 - 1)
        }
    }

    /// Number of `BLOCK_SIZE` blocks piece `index` is split into, including
    /// a shorter final block if the piece doesn't divide evenly.
    pub fn blocks_in_piece(&self, index: usize) -> u32 {
        let size = self.piece_size(index);
        if size <= 0 {
            return 0;
        }
        let block_size = i64::from(BLOCK_SIZE);
        ((size + block_size - 1) / block_size) as u32
    }

    /// Size in bytes of block `block_index` within piece `index`.
    pub fn block_size(&self, index: usize, block_index: u32) -> u32 {
        let piece_size = self.piece_size(index);
        let block_start = i64::from(block_index) * i64::from(BLOCK_SIZE);
        let remaining = piece_size - block_start;
        remaining.clamp(0, i64::from(BLOCK_SIZE)) as u32
    }
}

fn take_string(
    dict: &mut HashMap<Vec<u8>, BencodeValue>,
    key: &str,
) -> TorrentResult<Option<String>> {
    match dict.remove(key.as_bytes()) {
        Some(BencodeValue::String(bytes)) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| TorrentError::InvalidFormat(format!("{key} is not UTF-8: {e}"))),
        Some(_) => Err(TorrentError::InvalidFormat(format!("{key} is not a string"))),
        None => Ok(None),
    }
}

fn parse_pieces(pieces_bytes: &[u8]) -> TorrentResult<Vec<[u8; 20]>> {
    if pieces_bytes.len() % 20 != 0 {
        return Err(TorrentError::InvalidPiecesHashLength);
    }
    Ok(pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect())
}

fn parse_announce_list(value: BencodeValue) -> TorrentResult<Vec<Vec<String>>> {
    let tiers = match value {
        BencodeValue::List(tiers) => tiers,
        _ => return Err(TorrentError::InvalidFormat("announce-list not a list".into())),
    };
    tiers
        .into_iter()
        .map(|tier| match tier {
            BencodeValue::List(trackers) => trackers
                .into_iter()
                .map(|tracker| match tracker {
                    BencodeValue::String(s) => String::from_utf8(s).map_err(|e| {
                        TorrentError::InvalidFormat(format!("tracker URL not UTF-8: {e}"))
                    }),
                    _ => Err(TorrentError::InvalidFormat("tracker URL not a string".into())),
                })
                .collect(),
            _ => Err(TorrentError::InvalidFormat("announce tier not a list".into())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes(piece_length: i64, length: i64, num_pieces: usize) -> Vec<u8> {
        let mut info = HashMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(piece_length));
        info.insert(b"length".to_vec(), BencodeValue::Integer(length));
        info.insert(b"name".to_vec(), BencodeValue::String(b"file.bin".to_vec()));
        info.insert(
            b"pieces".to_vec(),
            BencodeValue::String(vec![0u8; 20 * num_pieces]),
        );
        let mut root = HashMap::new();
        root.insert(
            b"announce".to_vec(),
            BencodeValue::String(b"http://tracker/".to_vec()),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        bencode::encode(&BencodeValue::Dict(root))
    }

    #[test]
    fn private_flag_defaults_false_and_parses_when_present() {
        let bytes = sample_bytes(32768, 32768, 1);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert!(!torrent.private);

        let mut info = HashMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(32768));
        info.insert(b"length".to_vec(), BencodeValue::Integer(32768));
        info.insert(b"name".to_vec(), BencodeValue::String(b"file.bin".to_vec()));
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![0u8; 20]));
        info.insert(b"private".to_vec(), BencodeValue::Integer(1));
        let mut root = HashMap::new();
        root.insert(
            b"announce".to_vec(),
            BencodeValue::String(b"http://tracker/".to_vec()),
        );
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let bytes = bencode::encode(&BencodeValue::Dict(root));
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert!(torrent.private);
    }

    #[test]
    fn parses_three_piece_torrent() {
        let bytes = sample_bytes(32768, 98304, 3);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert_eq!(torrent.announce, "http://tracker/");
        assert_eq!(torrent.length, 98304);
        assert_eq!(torrent.num_pieces(), 3);
        assert_eq!(torrent.piece_size(0), 32768);
        assert_eq!(torrent.piece_size(2), 32768);
    }

    #[test]
    fn last_piece_shorter_than_piece_length() {
        // 98304 + 100 total with piece_length 32768 -> 4 pieces, last is 100 bytes.
        let bytes = sample_bytes(32768, 98404, 4);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert_eq!(torrent.piece_size(3), 100);
        assert_eq!(torrent.blocks_in_piece(3), 1);
        assert_eq!(torrent.block_size(3, 0), 100);
    }

    #[test]
    fn single_block_piece_below_block_size() {
        let bytes = sample_bytes(32, 32, 1);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert_eq!(torrent.blocks_in_piece(0), 1);
        assert_eq!(torrent.block_size(0, 0), 32);
    }

    #[test]
    fn length_equals_piece_length_is_one_piece() {
        let bytes = sample_bytes(65536, 65536, 1);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert_eq!(torrent.num_pieces(), 1);
        assert_eq!(torrent.piece_size(0), 65536);
    }

    #[test]
    fn exact_multiple_of_block_size_has_no_short_final_block() {
        let bytes = sample_bytes(32768, 32768, 1);
        let torrent = TorrentFile::from_bytes(&bytes).unwrap();
        assert_eq!(torrent.blocks_in_piece(0), 2);
        assert_eq!(torrent.block_size(0, 0), 16384);
        assert_eq!(torrent.block_size(0, 1), 16384);
    }
}
