use crate::bencode;
use crate::bencode::BencodeValue;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// Computes the SHA-1 of the canonical bencode encoding of an `info` dict.
///
/// This re-encodes the already-decoded dict rather than hashing the
/// original file bytes. For a `.torrent` file whose `info` dict was
/// already in canonical (sorted-key) form — true of every real torrent
/// client's output — the two are identical, but a hand-crafted file with
/// out-of-order keys would hash differently here than against its raw
/// bytes.
pub fn calculate_info_hash(info_dict: &HashMap<Vec<u8>, BencodeValue>) -> [u8; 20] {
    let encoded = bencode::encode(&BencodeValue::Dict(info_dict.clone()));

    let mut hasher = Sha1::new();
    hasher.update(&encoded);
    let digest = hasher.finalize();

    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&digest);
    info_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_is_deterministic() {
        let mut dict = HashMap::new();
        dict.insert(b"length".to_vec(), BencodeValue::Integer(10));
        dict.insert(
            b"name".to_vec(),
            BencodeValue::String(b"file.txt".to_vec()),
        );
        let first = calculate_info_hash(&dict);
        let second = calculate_info_hash(&dict);
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);
    }
}
