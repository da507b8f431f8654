//! A single peer's download session: handshake, negotiation, and a
//! pipelined request loop drawing blocks from a shared work pool.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::split;
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::pieces::{PieceBlock, Pieces};

use super::handshake::Handshake;
use super::io::{signal_closed, PeerReader, PeerWriter};
use super::wire::{PeerMessage, RequestPayload};
use super::{PeerError, PeerResult};

/// Where a session is in the handshake/negotiation/transfer lifecycle.
/// Tracked only for logging — the control flow in [`PeerSession::run`]
/// is the actual state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Connecting,
    HandshakeSent,
    HandshakeReceived,
    ExtendedNegotiate,
    AwaitUnchoke,
    Active,
    Done,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of block requests this session keeps in flight at
    /// once, per the REQUEST/PIECE pipelining redesign: a bounded
    /// semaphore rather than one task per outstanding request.
    pub pipeline_window: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pipeline_window: 5,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives one peer connection end to end: connect, handshake, negotiate,
/// then pull blocks from `pieces` until the pool is drained or the peer
/// disconnects.
pub struct PeerSession {
    addr: SocketAddr,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
    pieces: Arc<Pieces>,
    config: SessionConfig,
}

impl PeerSession {
    pub fn new(
        addr: SocketAddr,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
        pieces: Arc<Pieces>,
        config: SessionConfig,
    ) -> Self {
        Self {
            addr,
            info_hash,
            peer_id,
            pieces,
            config,
        }
    }

    #[instrument(skip(self), fields(peer = %self.addr))]
    pub async fn run(&self) -> PeerResult<()> {
        let mut state = SessionState::Init;
        debug!(?state, "starting session");

        state = SessionState::Connecting;
        debug!(?state);
        let (stream, their_handshake) = timeout(
            self.config.connect_timeout,
            Handshake::do_handshake(self.addr, self.info_hash, self.peer_id),
        )
        .await
        .map_err(|_| PeerError::Timeout)??;
        state = SessionState::HandshakeReceived;
        debug!(?state, supports_extensions = their_handshake.supports_extensions());

        let closed = Arc::new(Notify::new());
        let (read_half, write_half) = split(stream);
        let reader = Arc::new(PeerReader::new(read_half, closed.clone()));
        let writer = Arc::new(PeerWriter::new(write_half, closed.clone()));

        if their_handshake.supports_extensions() {
            state = SessionState::ExtendedNegotiate;
            debug!(?state);
            self.negotiate_extensions(&writer).await?;
        }

        writer.write_message(&PeerMessage::Interested).await?;
        state = SessionState::AwaitUnchoke;
        debug!(?state);
        self.await_unchoke(&reader).await?;

        state = SessionState::Active;
        debug!(?state);
        let result = self.transfer_loop(reader, writer, closed.clone()).await;
        signal_closed(&closed);

        state = if result.is_ok() {
            SessionState::Done
        } else {
            SessionState::Closed
        };
        debug!(?state, "session ended");
        result
    }

    /// Sends a minimal BEP-10 extended handshake advertising no extension
    /// IDs of our own, and reads back the peer's if one arrives promptly.
    /// Full extension negotiation (metadata exchange, PEX, etc.) is out of
    /// scope — this only proves the reserved-bit advertisement round-trips.
    async fn negotiate_extensions<W>(&self, writer: &PeerWriter<W>) -> PeerResult<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut handshake_dict = HashMap::new();
        handshake_dict.insert(b"m".to_vec(), crate::bencode::BencodeValue::Dict(HashMap::new()));
        let payload = crate::bencode::encode(&crate::bencode::BencodeValue::Dict(handshake_dict));
        writer
            .write_message(&PeerMessage::Extended { id: 0, payload })
            .await
    }

    async fn await_unchoke<R>(&self, reader: &PeerReader<R>) -> PeerResult<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let deadline = self.config.read_timeout;
        loop {
            let message = timeout(deadline, reader.read_message())
                .await
                .map_err(|_| PeerError::Timeout)??;
            match message {
                PeerMessage::Unchoke => return Ok(()),
                PeerMessage::Choke | PeerMessage::Bitfield(_) | PeerMessage::Have(_) => continue,
                PeerMessage::Extended { .. } | PeerMessage::KeepAlive => continue,
                other => {
                    return Err(PeerError::UnexpectedMessage(format!(
                        "expected unchoke before transfer, got {other:?}"
                    )))
                }
            }
        }
    }

    /// Runs the reader and writer halves of the active transfer
    /// concurrently: the writer pulls blocks from the shared pool and
    /// requests them up to `pipeline_window` at a time, the reader
    /// matches incoming `Piece` messages back to their request and
    /// releases the corresponding pipeline slot.
    ///
    /// The two tasks are raced rather than jointly awaited: if the peer
    /// dies mid-transfer, the reader returns an error (timeout/EOF) while
    /// the writer may be permanently parked on `semaphore.acquire_owned()`
    /// — nothing it's waiting on ever resolves on its own. As soon as
    /// either task finishes, the semaphore is closed and `closed` is
    /// signaled so the other task unblocks cooperatively (a parked
    /// `acquire_owned` returns `Err` on a closed semaphore, a parked
    /// read/write returns `ConnectionClosed` via the `closed` signal) and
    /// exits through its own bookkeeping rather than being cut off
    /// mid-flight.
    async fn transfer_loop<R, W>(
        &self,
        reader: Arc<PeerReader<R>>,
        writer: Arc<PeerWriter<W>>,
        closed: Arc<Notify>,
    ) -> PeerResult<()>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
        W: tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline_window));
        let pending: Arc<Mutex<HashMap<(u32, u32), (PieceBlock, OwnedSemaphorePermit)>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let writer_pieces = self.pieces.clone();
        let writer_pending = pending.clone();
        let writer_semaphore = semaphore.clone();
        let writer_task = tokio::spawn(async move {
            loop {
                if writer_pieces.is_done().await {
                    return Ok(());
                }
                // Acquire the pipeline slot before pulling a block from
                // the pool: if the semaphore is closed while this is
                // parked here (the peer died and the reader side closed
                // it), no block has been marked in-flight yet, so there's
                // nothing to leak.
                let permit = match writer_semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Ok(()),
                };
                let Some(block) = writer_pieces.get_request().await else {
                    // Pool temporarily has nothing unassigned but isn't
                    // done (other sessions hold the remaining blocks in
                    // flight); this session has no more work to contribute.
                    drop(permit);
                    return Ok(());
                };
                writer_pending
                    .lock()
                    .await
                    .insert((block.piece_index, block.begin), (block, permit));
                let request = PeerMessage::Request(RequestPayload {
                    index: block.piece_index,
                    begin: block.begin,
                    length: block.length,
                });
                if let Err(e) = writer.write_message(&request).await {
                    writer_pending
                        .lock()
                        .await
                        .remove(&(block.piece_index, block.begin));
                    writer_pieces.return_in_queue(block).await;
                    return Err::<(), PeerError>(e);
                }
            }
        });

        let reader_pieces = self.pieces.clone();
        let reader_pending = pending.clone();
        let read_timeout = self.config.read_timeout;
        let reader_task = tokio::spawn(async move {
            loop {
                if reader_pieces.is_done().await {
                    return Ok(());
                }
                let message = match timeout(read_timeout, reader.read_message()).await {
                    Ok(Ok(message)) => message,
                    Ok(Err(e)) => return Err::<(), PeerError>(e),
                    Err(_) => return Err(PeerError::Timeout),
                };
                match message {
                    PeerMessage::Piece(payload) => {
                        let key = (payload.index, payload.begin);
                        let entry = reader_pending.lock().await.remove(&key);
                        let Some((block, _permit)) = entry else {
                            warn!(?key, "received piece for a block we didn't request");
                            continue;
                        };
                        if let Err(e) = reader_pieces.put_processed(block, payload.block).await {
                            return Err(PeerError::MalformedMessage(e.to_string()));
                        }
                    }
                    PeerMessage::Choke => {
                        return Err(PeerError::UnexpectedMessage(
                            "peer choked us mid-transfer".to_string(),
                        ));
                    }
                    PeerMessage::KeepAlive
                    | PeerMessage::Have(_)
                    | PeerMessage::Unchoke
                    | PeerMessage::Bitfield(_)
                    | PeerMessage::Extended { .. } => continue,
                    other => {
                        return Err(PeerError::UnexpectedMessage(format!(
                            "unexpected message during transfer: {other:?}"
                        )))
                    }
                }
            }
        });

        let mut writer_task = writer_task;
        let mut reader_task = reader_task;
        let (primary_result, loser) = tokio::select! {
            res = &mut writer_task => {
                (res.unwrap_or(Err(PeerError::ConnectionClosed)), reader_task)
            }
            res = &mut reader_task => {
                (res.unwrap_or(Err(PeerError::ConnectionClosed)), writer_task)
            }
        };

        // A writer that finishes `Ok` just means this session has nothing
        // left to originate — the pool may still have other blocks this
        // session already requested in flight, which only the reader can
        // collect, so the reader is left to run to its own conclusion. A
        // reader that finishes `Ok` only happens once the pool is fully
        // done, at which point the writer's permits have already been
        // freed and it's moments from exiting on its own. Only an error
        // means the connection is presumably broken — that's the one case
        // where the other side needs to be unblocked rather than waited
        // on, since it may be parked on the pipeline semaphore (if it's
        // the writer) or a blocked read/write with nothing left to wake
        // it.
        if primary_result.is_err() {
            semaphore.close();
            signal_closed(&closed);
        }
        let _ = loser.await;

        // Any block still marked pending once both tasks are done was
        // never acknowledged; give it back to the pool for another
        // session.
        let mut pending = pending.lock().await;
        for (block, _permit) in pending.drain().map(|(_, v)| v) {
            self.pieces.return_in_queue(block).await;
        }
        drop(pending);

        primary_result
    }
}
