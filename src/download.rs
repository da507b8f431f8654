//! Download orchestration: announce to the tracker, run one session per
//! peer, respawn against the next candidate peer when a session dies, and
//! write the assembled file once every block has arrived.
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::client::ClientConfig;
use crate::peer::session::{PeerSession, SessionConfig};
use crate::peer::PeerResult;
use crate::pieces::Pieces;
use crate::torrent::file::TorrentFile;
use crate::tracker::{Client as TrackerClient, Peer, TrackerError};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("tracker returned no peers")]
    NoPeers,

    #[error("ran out of peers before the download finished")]
    Incomplete,
}

pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Downloads `torrent` to `output`, using `config` to size the peer pool
/// and pipelining, optionally SHA-1-verifying each piece as it completes.
#[instrument(skip(torrent, config), fields(announce = %torrent.announce))]
pub async fn download_to_file(
    torrent: &TorrentFile,
    output: &Path,
    config: &ClientConfig,
    verify_pieces: bool,
) -> DownloadResult<()> {
    let pieces = Arc::new(if verify_pieces {
        Pieces::new_with_verification(torrent)
    } else {
        Pieces::new(torrent)
    });
    run_against_swarm(torrent, pieces.clone(), config).await?;
    write_out(&pieces, output).await
}

/// Downloads a single piece of `torrent` to `output` — the same swarm
/// logic as [`download_to_file`], restricted to one piece's blocks.
#[instrument(skip(torrent, config), fields(announce = %torrent.announce, piece_index))]
pub async fn download_piece_to_file(
    torrent: &TorrentFile,
    piece_index: u32,
    output: &Path,
    config: &ClientConfig,
    verify_piece: bool,
) -> DownloadResult<()> {
    let pieces = Arc::new(Pieces::single_piece(torrent, piece_index, verify_piece));
    run_against_swarm(torrent, pieces.clone(), config).await?;
    write_out(&pieces, output).await
}

async fn write_out(pieces: &Pieces, output: &Path) -> DownloadResult<()> {
    let data = pieces.blocks().await;
    let mut file = File::create(output).await?;
    file.write_all(&data).await?;
    info!(bytes = data.len(), path = %output.display(), "wrote completed download");
    Ok(())
}

async fn run_against_swarm(
    torrent: &TorrentFile,
    pieces: Arc<Pieces>,
    config: &ClientConfig,
) -> DownloadResult<()> {
    let tracker_client = TrackerClient::new(config.port);
    let announce = tracker_client.announce(torrent).await?;
    if announce.peers.is_empty() {
        return Err(DownloadError::NoPeers);
    }
    info!(peer_count = announce.peers.len(), "tracker returned peers");

    let peer_id = tracker_client.peer_id();
    let info_hash = torrent.info_hash;
    let mut candidates: VecDeque<Peer> = announce.peers.into_iter().collect();
    let mut joinset: JoinSet<(SocketAddr, PeerResult<()>)> = JoinSet::new();

    for _ in 0..config.max_peers {
        match candidates.pop_front() {
            Some(peer) => spawn_session(
                &mut joinset,
                peer,
                info_hash,
                peer_id,
                pieces.clone(),
                config.session.clone(),
            ),
            None => break,
        }
    }

    while let Some(joined) = joinset.join_next().await {
        let (addr, result) = joined.map_err(|e| DownloadError::Io(std::io::Error::other(e)))?;
        match result {
            Ok(()) => info!(%addr, "peer session finished"),
            Err(e) => warn!(%addr, error = %e, "peer session failed"),
        }

        if pieces.is_done().await {
            break;
        }

        if let Some(peer) = candidates.pop_front() {
            spawn_session(
                &mut joinset,
                peer,
                info_hash,
                peer_id,
                pieces.clone(),
                config.session.clone(),
            );
        }
    }

    if !pieces.is_done().await {
        return Err(DownloadError::Incomplete);
    }
    Ok(())
}

fn spawn_session(
    joinset: &mut JoinSet<(SocketAddr, PeerResult<()>)>,
    peer: Peer,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    pieces: Arc<Pieces>,
    session_config: SessionConfig,
) {
    let addr = SocketAddr::new(peer.ip, peer.port);
    let session = PeerSession::new(addr, info_hash, peer_id, pieces, session_config);
    joinset.spawn(async move {
        let result = session.run().await;
        (addr, result)
    });
}
