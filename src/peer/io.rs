//! Serialized, closable read/write halves of a peer connection.
//!
//! Mirrors a reader/writer split where a shared "closed" signal races
//! against in-flight reads and writes: once a session decides to tear
//! down, any blocked I/O unblocks with `PeerError::ConnectionClosed`
//! instead of waiting indefinitely on a peer that will never respond.
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Notify};

use super::wire::PeerMessage;
use super::{PeerError, PeerResult};

/// The read half of a peer connection. Holds the lock around the
/// underlying stream so only one task reads at a time.
pub struct PeerReader<R> {
    half: Mutex<R>,
    closed: Arc<Notify>,
}

impl<R: AsyncRead + Unpin> PeerReader<R> {
    pub fn new(half: R, closed: Arc<Notify>) -> Self {
        Self {
            half: Mutex::new(half),
            closed,
        }
    }

    /// Reads the next message, or returns `ConnectionClosed` if the
    /// session is torn down while the read is in flight.
    pub async fn read_message(&self) -> PeerResult<PeerMessage> {
        let mut half = self.half.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.notified() => Err(PeerError::ConnectionClosed),
            result = PeerMessage::read_from(&mut *half) => result,
        }
    }
}

/// The write half of a peer connection. Holds the lock around the
/// underlying stream so concurrent writers serialize instead of
/// interleaving partial messages.
pub struct PeerWriter<W> {
    half: Mutex<W>,
    closed: Arc<Notify>,
}

impl<W: AsyncWrite + Unpin> PeerWriter<W> {
    pub fn new(half: W, closed: Arc<Notify>) -> Self {
        Self {
            half: Mutex::new(half),
            closed,
        }
    }

    pub async fn write_message(&self, message: &PeerMessage) -> PeerResult<()> {
        let mut half = self.half.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.notified() => Err(PeerError::ConnectionClosed),
            result = message.write_to(&mut *half) => result,
        }
    }
}

/// Wakes every task currently blocked in `read_message`/`write_message` on
/// this connection's shared signal.
pub fn signal_closed(closed: &Notify) {
    closed.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::wire::RequestPayload;

    #[tokio::test]
    async fn writes_and_reads_across_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(256);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        let closed = Arc::new(Notify::new());
        let writer = PeerWriter::new(client_write, closed.clone());
        let reader = PeerReader::new(server_read, closed.clone());

        let message = PeerMessage::Request(RequestPayload {
            index: 0,
            begin: 0,
            length: 16384,
        });
        writer.write_message(&message).await.unwrap();
        let received = reader.read_message().await.unwrap();
        assert_eq!(received, message);

        drop(client_read);
        drop(server_write);
    }

    #[tokio::test]
    async fn closing_unblocks_a_pending_read() {
        let (_client, server) = tokio::io::duplex(256);
        let (server_read, _server_write) = tokio::io::split(server);
        let closed = Arc::new(Notify::new());
        let reader = PeerReader::new(server_read, closed.clone());

        let read_task = tokio::spawn(async move { reader.read_message().await });
        tokio::task::yield_now().await;
        signal_closed(&closed);

        let result = read_task.await.unwrap();
        assert!(matches!(result, Err(PeerError::ConnectionClosed)));
    }
}
