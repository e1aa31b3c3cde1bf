//! Connection handle
//!
//! The write side of one connection, shared between its session and the
//! membership registry. Every write carries a deadline. The registry evicts
//! a handle whose write failed; the owning session watches for that and
//! ends itself.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::{watch, Mutex};
use tokio_util::codec::FramedWrite;

use crate::codec::ChatCodec;
use crate::error::AppError;
use crate::types::SessionId;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable handle to one connection's line writer
///
/// Clones share the same underlying writer; writes from different clones
/// are serialized line by line.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: SessionId,
    sink: Arc<Mutex<FramedWrite<BoxedWriter, ChatCodec>>>,
    evicted: Arc<watch::Sender<bool>>,
    write_timeout: Duration,
}

impl ConnectionHandle {
    /// Wrap a writer for the session `id`
    pub fn new<W>(id: SessionId, writer: W, write_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: BoxedWriter = Box::new(writer);
        Self {
            id,
            sink: Arc::new(Mutex::new(FramedWrite::new(writer, ChatCodec::new()))),
            evicted: Arc::new(watch::channel(false).0),
            write_timeout,
        }
    }

    /// Session this handle belongs to
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Mark this connection as dropped from the chat
    pub fn evict(&self) {
        self.evicted.send_replace(true);
    }

    pub fn is_evicted(&self) -> bool {
        *self.evicted.borrow()
    }

    /// Resolves once the handle has been evicted
    pub async fn evicted(&self) {
        let mut rx = self.evicted.subscribe();
        // The sender lives as long as self, so this only returns on eviction
        let _ = rx.wait_for(|evicted| *evicted).await;
    }

    /// Write one line (newline appended) and flush it
    ///
    /// Fails with `WriteTimeout` if the line is not flushed within the deadline.
    pub async fn send_line(&self, line: &str) -> Result<(), AppError> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(line).await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::WriteTimeout(self.write_timeout)),
        }
    }

    /// Flush and shut down the write side
    pub async fn close(&self) -> Result<(), AppError> {
        let close = async {
            let mut sink = self.sink.lock().await;
            SinkExt::<&str>::close(&mut *sink).await
        };
        match tokio::time::timeout(self.write_timeout, close).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::WriteTimeout(self.write_timeout)),
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio::io::AsyncReadExt;
    use tokio_util::codec::{FramedRead, LinesCodec};

    #[tokio::test]
    async fn test_send_line_appends_newline() {
        let (local, remote) = tokio::io::duplex(1024);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_secs(1));

        handle.send_line("hello").await.unwrap();
        handle.send_line("world").await.unwrap();

        let mut lines = FramedRead::new(remote, LinesCodec::new());
        assert_eq!(lines.next().await.unwrap().unwrap(), "hello");
        assert_eq!(lines.next().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn test_send_line_times_out_when_peer_stalls() {
        // Tiny buffer that nobody drains
        let (local, _remote) = tokio::io::duplex(8);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_millis(50));

        let err = handle
            .send_line("this line is much longer than eight bytes")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::WriteTimeout(_)));
    }

    #[tokio::test]
    async fn test_send_line_fails_after_peer_dropped() {
        let (local, remote) = tokio::io::duplex(64);
        drop(remote);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_secs(1));

        assert!(handle.send_line("anyone?").await.is_err());
    }

    #[tokio::test]
    async fn test_close_signals_eof() {
        let (local, mut remote) = tokio::io::duplex(64);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_secs(1));

        handle.send_line("bye").await.unwrap();
        handle.close().await.unwrap();

        let mut buf = String::new();
        remote.read_to_string(&mut buf).await.unwrap();
        assert_eq!(buf, "bye\n");
    }

    #[tokio::test]
    async fn test_clones_share_identity() {
        let (local, _remote) = tokio::io::duplex(64);
        let id = SessionId::new();
        let handle = ConnectionHandle::new(id, local, Duration::from_secs(1));
        let clone = handle.clone();
        assert_eq!(clone.id(), id);
    }

    #[tokio::test]
    async fn test_eviction_seen_by_every_clone() {
        let (local, _remote) = tokio::io::duplex(64);
        let handle = ConnectionHandle::new(SessionId::new(), local, Duration::from_secs(1));
        let watcher = handle.clone();
        assert!(!watcher.is_evicted());

        let waiting = tokio::spawn(async move { watcher.evicted().await });
        handle.evict();

        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("eviction not observed")
            .unwrap();
        assert!(handle.is_evicted());
    }
}
