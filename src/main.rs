use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use leechrs::bencode;
use leechrs::client::ClientConfig;
use leechrs::download;
use leechrs::peer::handshake::Handshake;
use leechrs::torrent::file::TorrentFile;
use leechrs::torrent::magnet::MagnetLink;
use leechrs::tracker::Client as TrackerClient;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Decode { bencoded } => cmd_decode(&bencoded),
        Command::Info { torrent } => cmd_info(&torrent),
        Command::Peers { torrent } => cmd_peers(&torrent).await,
        Command::Handshake { torrent, peer_addr } => cmd_handshake(&torrent, &peer_addr).await,
        Command::DownloadPiece {
            output,
            torrent,
            piece_index,
            verify,
        } => cmd_download_piece(&torrent, piece_index, &output, verify).await,
        Command::Download {
            output,
            torrent,
            verify,
        } => cmd_download(&torrent, &output, verify).await,
        Command::MagnetParse { uri } => cmd_magnet_parse(&uri),
        Command::MagnetInfo { uri } => cmd_magnet_info(&uri),
        Command::MagnetHandshake { uri } => cmd_magnet_handshake(&uri).await,
        Command::MagnetDownloadPiece { .. } | Command::MagnetDownload { .. } => {
            bail!(
                "magnet downloads require BEP-9 metadata exchange, which this client does not \
                 implement; fetch a .torrent file and use `download`/`download_piece` instead"
            )
        }
    }
}

fn cmd_decode(bencoded: &str) -> Result<()> {
    let value = bencode::decode_all(bencoded.as_bytes()).context("decoding bencoded string")?;
    println!("{}", value.to_display_string());
    Ok(())
}

fn load_torrent(path: &std::path::Path) -> Result<TorrentFile> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    TorrentFile::from_bytes(&raw).context("parsing torrent metainfo")
}

fn cmd_info(torrent_path: &std::path::Path) -> Result<()> {
    let torrent = load_torrent(torrent_path)?;
    println!("Tracker URL: {}", torrent.announce);
    println!("Length: {}", torrent.length);
    println!("Info Hash: {}", hex::encode(torrent.info_hash));
    println!("Piece Length: {}", torrent.piece_length);
    println!("Piece Hashes:");
    for hash in &torrent.piece_hashes {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}

async fn cmd_peers(torrent_path: &std::path::Path) -> Result<()> {
    let torrent = load_torrent(torrent_path)?;
    let client = TrackerClient::new(ClientConfig::default().port);
    let response = client.announce(&torrent).await.context("announcing to tracker")?;
    for peer in response.peers {
        println!("{}:{}", peer.ip, peer.port);
    }
    Ok(())
}

async fn cmd_handshake(torrent_path: &std::path::Path, peer_addr: &str) -> Result<()> {
    let torrent = load_torrent(torrent_path)?;
    let addr: SocketAddr = peer_addr
        .parse()
        .with_context(|| format!("parsing peer address {peer_addr}"))?;
    let our_peer_id = random_peer_id();
    let (_stream, their_handshake) =
        Handshake::do_handshake(addr, torrent.info_hash, our_peer_id)
            .await
            .context("performing handshake")?;
    println!("Peer ID: {}", hex::encode(their_handshake.peer_id));
    Ok(())
}

async fn cmd_download_piece(
    torrent_path: &std::path::Path,
    piece_index: u32,
    output: &std::path::Path,
    verify: bool,
) -> Result<()> {
    let torrent = load_torrent(torrent_path)?;
    let config = ClientConfig::default();
    download::download_piece_to_file(&torrent, piece_index, output, &config, verify)
        .await
        .context("downloading piece")?;
    println!("Piece {piece_index} downloaded to {}.", output.display());
    Ok(())
}

async fn cmd_download(torrent_path: &std::path::Path, output: &std::path::Path, verify: bool) -> Result<()> {
    let torrent = load_torrent(torrent_path)?;
    let config = ClientConfig::default();
    download::download_to_file(&torrent, output, &config, verify)
        .await
        .context("downloading torrent")?;
    println!("Downloaded {} to {}.", torrent_path.display(), output.display());
    Ok(())
}

fn cmd_magnet_parse(uri: &str) -> Result<()> {
    let magnet = MagnetLink::parse(uri).context("parsing magnet link")?;
    println!("Info Hash: {}", hex::encode(magnet.info_hash));
    if let Some(name) = &magnet.display_name {
        println!("Name: {name}");
    }
    for tracker in &magnet.trackers {
        println!("Tracker URL: {tracker}");
    }
    Ok(())
}

fn cmd_magnet_info(uri: &str) -> Result<()> {
    // No metainfo is reachable from a magnet URI alone without BEP-9
    // metadata exchange, so this prints only what the URI itself carries.
    cmd_magnet_parse(uri)
}

async fn cmd_magnet_handshake(uri: &str) -> Result<()> {
    let magnet = MagnetLink::parse(uri).context("parsing magnet link")?;
    let tracker_url = magnet
        .trackers
        .first()
        .context("magnet link has no tracker URL to announce to")?;

    let pseudo_torrent = TorrentFile {
        announce: tracker_url.clone(),
        announce_list: Vec::new(),
        creation_date: None,
        comment: String::new(),
        created_by: String::new(),
        encoding: String::new(),
        name: magnet.display_name.clone().unwrap_or_default(),
        length: 0,
        piece_length: 0,
        piece_hashes: Vec::new(),
        info_hash: magnet.info_hash,
        private: false,
    };

    let client = TrackerClient::new(ClientConfig::default().port);
    let response = client
        .announce(&pseudo_torrent)
        .await
        .context("announcing to tracker")?;
    let peer = response
        .peers
        .first()
        .context("tracker returned no peers")?;
    let addr = SocketAddr::new(peer.ip, peer.port);

    let our_peer_id = random_peer_id();
    let (_stream, their_handshake) =
        Handshake::do_handshake(addr, magnet.info_hash, our_peer_id)
            .await
            .context("performing handshake")?;
    println!("Peer ID: {}", hex::encode(their_handshake.peer_id));
    Ok(())
}

fn random_peer_id() -> [u8; 20] {
    use rand::Rng;
    let mut id = [0u8; 20];
    let prefix = b"-RT0001-";
    id[..prefix.len()].copy_from_slice(prefix);
    rand::rng().fill(&mut id[prefix.len()..]);
    id
}
