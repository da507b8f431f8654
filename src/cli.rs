//! Command-line surface: one subcommand per external interface this
//! client exposes, dispatched from `main.rs`.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "leechrs", version, about = "A BitTorrent-1.0 leecher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a bencoded string and pretty-print its value.
    Decode { bencoded: String },

    /// Print a `.torrent` file's tracker URL, length, info hash, and
    /// piece hashes.
    Info { torrent: PathBuf },

    /// Announce to the tracker and print each returned peer as `ip:port`.
    Peers { torrent: PathBuf },

    /// Perform the handshake with one peer and print its peer ID.
    Handshake { torrent: PathBuf, peer_addr: String },

    /// Download a single piece and write it to `output`.
    DownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        piece_index: u32,
        /// Verify the piece's SHA-1 hash before writing it out.
        #[arg(long)]
        verify: bool,
    },

    /// Download the whole torrent and write it to `output`.
    Download {
        #[arg(short, long)]
        output: PathBuf,
        torrent: PathBuf,
        /// Verify each piece's SHA-1 hash as it completes.
        #[arg(long)]
        verify: bool,
    },

    /// Parse a magnet URI and print its info hash, display name, and
    /// tracker URLs.
    MagnetParse { uri: String },

    /// Print what a magnet URI alone can tell us about the torrent.
    ///
    /// Unlike `info`, this has no metainfo to read length or piece
    /// hashes from — BEP-9 metadata exchange is out of scope, so only
    /// the fields the magnet URI itself carries are shown.
    MagnetInfo { uri: String },

    /// Announce via the magnet's tracker URLs and handshake with the
    /// first peer returned.
    MagnetHandshake { uri: String },

    /// Download a single piece by magnet URI. Requires metadata exchange
    /// (BEP-9), which this client does not implement.
    MagnetDownloadPiece {
        #[arg(short, long)]
        output: PathBuf,
        uri: String,
        piece_index: u32,
    },

    /// Download the full torrent by magnet URI. Requires metadata
    /// exchange (BEP-9), which this client does not implement.
    MagnetDownload {
        #[arg(short, long)]
        output: PathBuf,
        uri: String,
    },
}
