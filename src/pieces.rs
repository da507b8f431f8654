//! The shared block work pool that every peer session draws from.
//!
//! Grounded on a request/queue/in-progress/completed split, generalized
//! from a single-threaded event loop to a pool guarded by an async mutex:
//! nothing here may assume only one task touches it at a time, so every
//! operation takes the lock for its whole critical section rather than
//! relying on cooperative scheduling to avoid interleaving.
use std::collections::{HashMap, HashSet, VecDeque};

use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::torrent::file::TorrentFile;

#[derive(Debug, Error)]
pub enum PiecesError {
    #[error("piece {0} failed hash verification")]
    HashMismatch(u32),
}

pub type PiecesResult<T> = std::result::Result<T, PiecesError>;

/// One outstanding (or completed) block request: a piece index, a byte
/// offset within that piece, and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceBlock {
    pub piece_index: u32,
    pub begin: u32,
    pub length: u32,
}

struct Inner {
    unassigned: VecDeque<PieceBlock>,
    in_flight: HashSet<PieceBlock>,
    /// Bytes received per block, keyed by (piece_index, begin).
    block_data: HashMap<(u32, u32), Vec<u8>>,
    /// Assembled bytes of each completed, verified piece.
    completed_pieces: HashMap<u32, Vec<u8>>,
    blocks_per_piece: HashMap<u32, u32>,
}

/// The block-level work pool for a single torrent download.
///
/// Verification is opt-in: by default a piece is considered done once all
/// its blocks have arrived, with no SHA-1 check against the torrent's
/// piece hashes. Callers that want end-to-end integrity should use
/// [`Pieces::new_with_verification`].
pub struct Pieces {
    piece_hashes: Vec<[u8; 20]>,
    total_length: i64,
    verify: bool,
    inner: Mutex<Inner>,
}

impl Pieces {
    pub fn new(torrent: &TorrentFile) -> Self {
        Self::build(torrent, &(0..torrent.num_pieces() as u32).collect::<Vec<_>>(), false)
    }

    /// Builds a pool that SHA-1-verifies each piece against the torrent's
    /// `pieces` hashes as it completes.
    pub fn new_with_verification(torrent: &TorrentFile) -> Self {
        Self::build(torrent, &(0..torrent.num_pieces() as u32).collect::<Vec<_>>(), true)
    }

    /// Builds a pool covering only `piece_index`, for single-piece
    /// downloads. `total_length` reflects just that piece's size so
    /// `blocks()` returns exactly its bytes.
    pub fn single_piece(torrent: &TorrentFile, piece_index: u32, verify: bool) -> Self {
        Self::build(torrent, std::slice::from_ref(&piece_index), verify)
    }

    fn build(torrent: &TorrentFile, piece_indices: &[u32], verify: bool) -> Self {
        let mut unassigned = VecDeque::new();
        let mut blocks_per_piece = HashMap::new();
        let mut total_length = 0i64;
        for &piece_index in piece_indices {
            let num_blocks = torrent.blocks_in_piece(piece_index as usize);
            blocks_per_piece.insert(piece_index, num_blocks);
            total_length += torrent.piece_size(piece_index as usize);
            for block_index in 0..num_blocks {
                let length = torrent.block_size(piece_index as usize, block_index);
                unassigned.push_back(PieceBlock {
                    piece_index,
                    begin: block_index * crate::torrent::file::BLOCK_SIZE,
                    length,
                });
            }
        }

        Self {
            piece_hashes: torrent.piece_hashes.clone(),
            total_length,
            verify,
            inner: Mutex::new(Inner {
                unassigned,
                in_flight: HashSet::new(),
                block_data: HashMap::new(),
                completed_pieces: HashMap::new(),
                blocks_per_piece,
            }),
        }
    }

    /// Takes the next unassigned block, marking it in-flight.
    pub async fn get_request(&self) -> Option<PieceBlock> {
        let mut inner = self.inner.lock().await;
        let block = inner.unassigned.pop_front()?;
        inner.in_flight.insert(block);
        Some(block)
    }

    /// Records a block's data as received. If this was the last
    /// outstanding block of its piece, assembles and (optionally)
    /// verifies the piece.
    pub async fn put_processed(&self, block: PieceBlock, data: Vec<u8>) -> PiecesResult<()> {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(&block);
        inner
            .block_data
            .insert((block.piece_index, block.begin), data);

        let expected_blocks = *inner
            .blocks_per_piece
            .get(&block.piece_index)
            .unwrap_or(&0);
        let received_blocks = inner
            .block_data
            .keys()
            .filter(|(p, _)| *p == block.piece_index)
            .count() as u32;
        if received_blocks < expected_blocks {
            return Ok(());
        }

        let mut offsets: Vec<u32> = inner
            .block_data
            .keys()
            .filter(|(p, _)| *p == block.piece_index)
            .map(|(_, begin)| *begin)
            .collect();
        offsets.sort_unstable();
        let mut assembled = Vec::new();
        for begin in offsets {
            assembled.extend_from_slice(&inner.block_data[&(block.piece_index, begin)]);
        }

        if self.verify {
            if let Some(expected) = self.piece_hashes.get(block.piece_index as usize) {
                let mut hasher = Sha1::new();
                hasher.update(&assembled);
                let digest = hasher.finalize();
                if digest.as_slice() != expected {
                    return Err(PiecesError::HashMismatch(block.piece_index));
                }
            }
        }

        inner.completed_pieces.insert(block.piece_index, assembled);
        Ok(())
    }

    /// Returns a block to the unassigned queue, e.g. after the peer
    /// holding it disconnects or errors out.
    pub async fn return_in_queue(&self, block: PieceBlock) {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.remove(&block) {
            inner.unassigned.push_back(block);
        }
    }

    /// Whether every block across every piece has been received.
    pub async fn is_done(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.unassigned.is_empty()
            && inner.in_flight.is_empty()
            && inner.completed_pieces.len() == inner.blocks_per_piece.len()
    }

    /// Assembles the full downloaded content in piece order. Only
    /// meaningful once [`Pieces::is_done`] is true.
    pub async fn blocks(&self) -> Vec<u8> {
        let inner = self.inner.lock().await;
        let mut out = Vec::with_capacity(self.total_length.max(0) as usize);
        let mut indices: Vec<&u32> = inner.completed_pieces.keys().collect();
        indices.sort_unstable();
        for index in indices {
            out.extend_from_slice(&inner.completed_pieces[index]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{self, BencodeValue};
    use std::collections::HashMap as StdHashMap;

    fn torrent_with(piece_length: i64, length: i64, num_pieces: usize) -> TorrentFile {
        let mut info = StdHashMap::new();
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(piece_length));
        info.insert(b"length".to_vec(), BencodeValue::Integer(length));
        info.insert(b"name".to_vec(), BencodeValue::String(b"f".to_vec()));
        info.insert(
            b"pieces".to_vec(),
            BencodeValue::String(vec![0u8; 20 * num_pieces]),
        );
        let mut root = StdHashMap::new();
        root.insert(b"announce".to_vec(), BencodeValue::String(b"http://t/".to_vec()));
        root.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let bytes = bencode::encode(&BencodeValue::Dict(root));
        TorrentFile::from_bytes(&bytes).unwrap()
    }

    #[tokio::test]
    async fn drains_queue_and_reassembles_in_order() {
        let torrent = torrent_with(16384, 32768, 2);
        let pool = Pieces::new(&torrent);

        let mut received = Vec::new();
        while let Some(block) = pool.get_request().await {
            received.push(block);
        }
        assert_eq!(received.len(), 2);
        assert!(pool.get_request().await.is_none());

        for block in &received {
            let data = vec![block.piece_index as u8; block.length as usize];
            pool.put_processed(*block, data).await.unwrap();
        }

        assert!(pool.is_done().await);
        let blocks = pool.blocks().await;
        assert_eq!(blocks.len(), 32768);
        assert_eq!(blocks[0], 0);
        assert_eq!(blocks[16384], 1);
    }

    #[tokio::test]
    async fn returned_block_is_requestable_again() {
        let torrent = torrent_with(16384, 16384, 1);
        let pool = Pieces::new(&torrent);
        let block = pool.get_request().await.unwrap();
        assert!(pool.get_request().await.is_none());

        pool.return_in_queue(block).await;
        let reissued = pool.get_request().await.unwrap();
        assert_eq!(reissued, block);
    }

    #[tokio::test]
    async fn verification_rejects_corrupt_piece() {
        let torrent = torrent_with(4, 4, 1);
        let pool = Pieces::new_with_verification(&torrent);
        let block = pool.get_request().await.unwrap();
        let result = pool.put_processed(block, vec![0xaa; 4]).await;
        assert!(matches!(result, Err(PiecesError::HashMismatch(0))));
    }
}
