//! Shared read/write plumbing for stream-based endpoints.
//!
//! Serial ports and TCP sockets are both `AsyncRead + AsyncWrite` streams, so
//! the chunk-level rules live here once:
//!
//! - a read of 0 bytes means the peer closed the stream (end-of-stream);
//! - a chunk write uses `write_all` + `flush`, so it either delivers every
//!   byte or fails;
//! - any I/O error marks the endpoint `Failed`;
//! - `shutdown()` wakes a read that is blocked waiting for data and a write
//!   that is blocked on a full peer buffer.
//!
//! The stream is split into independent halves so one task can sit in a read
//! while another writes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use bridge_core::{EndpointError, Lifecycle, ReadOutcome};

/// Split halves of an open stream, or nothing before `install` / after
/// `shutdown`.
pub struct DuplexHalves<S> {
    reader: Mutex<Option<ReadHalf<S>>>,
    writer: Mutex<Option<WriteHalf<S>>>,
    closed: watch::Sender<bool>,
}

impl<S> DuplexHalves<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            closed,
        }
    }

    /// Stores a freshly opened stream.
    pub async fn install(&self, stream: S) {
        let (reader, writer) = tokio::io::split(stream);
        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(writer);
    }

    /// Reads up to `buf.len()` bytes.
    pub async fn read(
        &self,
        endpoint: &str,
        lifecycle: &Lifecycle,
        buf: &mut [u8],
    ) -> Result<ReadOutcome, EndpointError> {
        lifecycle.ensure_open(endpoint)?;

        let mut closed = self.closed.subscribe();
        let mut reader = self.reader.lock().await;
        let Some(stream) = reader.as_mut() else {
            return Err(EndpointError::closed(endpoint));
        };

        let read = tokio::select! {
            read = stream.read(buf) => read,
            _ = closed.wait_for(|c| *c) => return Err(EndpointError::closed(endpoint)),
        };

        match read {
            Ok(0) => {
                debug!(endpoint, "peer closed the stream");
                Ok(ReadOutcome::EndOfStream)
            }
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e) => {
                lifecycle.mark_failed();
                Err(EndpointError::io(endpoint, e))
            }
        }
    }

    /// Writes the whole chunk, then flushes.
    pub async fn write(
        &self,
        endpoint: &str,
        lifecycle: &Lifecycle,
        bytes: &[u8],
    ) -> Result<(), EndpointError> {
        lifecycle.ensure_open(endpoint)?;

        let mut closed = self.closed.subscribe();
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(EndpointError::closed(endpoint));
        };

        let written = tokio::select! {
            written = async {
                stream.write_all(bytes).await?;
                stream.flush().await
            } => written,
            _ = closed.wait_for(|c| *c) => return Err(EndpointError::closed(endpoint)),
        };

        written.map_err(|e| {
            lifecycle.mark_failed();
            EndpointError::io(endpoint, e)
        })
    }

    /// Resolves once `shutdown()` has been called.
    pub async fn wait_closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|c| *c).await;
    }

    /// Releases the stream.  Wakes any pending read or write first so both
    /// locks can be taken.
    pub async fn shutdown(&self) -> std::io::Result<()> {
        self.closed.send_replace(true);

        let writer = self.writer.lock().await.take();
        let reader = self.reader.lock().await.take();

        // Dropping both halves releases the underlying stream.
        let result = match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        };
        drop(reader);
        result
    }
}

impl<S> Default for DuplexHalves<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::EndpointState;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    async fn open_halves() -> (Arc<DuplexHalves<DuplexStream>>, Lifecycle, DuplexStream) {
        let (ours, theirs) = tokio::io::duplex(64);
        let halves = Arc::new(DuplexHalves::new());
        halves.install(ours).await;
        (halves, Lifecycle::new(EndpointState::Open), theirs)
    }

    #[tokio::test]
    async fn test_read_returns_peer_bytes() {
        // Arrange
        let (halves, lifecycle, mut peer) = open_halves().await;
        peer.write_all(b"PING").await.unwrap();

        // Act
        let mut buf = [0u8; 16];
        let outcome = halves.read("t", &lifecycle, &mut buf).await.unwrap();

        // Assert
        assert_eq!(outcome, ReadOutcome::Data(4));
        assert_eq!(&buf[..4], b"PING");
    }

    #[tokio::test]
    async fn test_peer_close_is_end_of_stream() {
        let (halves, lifecycle, peer) = open_halves().await;
        drop(peer);

        let mut buf = [0u8; 16];
        let outcome = halves.read("t", &lifecycle, &mut buf).await.unwrap();

        assert_eq!(outcome, ReadOutcome::EndOfStream);
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (halves, lifecycle, mut peer) = open_halves().await;

        halves.write("t", &lifecycle, b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_read() {
        // Arrange: the peer never writes
        let (halves, lifecycle, _peer) = open_halves().await;
        let lifecycle = Arc::new(lifecycle);
        let reader = {
            let halves = Arc::clone(&halves);
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                halves.read("t", &lifecycle, &mut buf).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        halves.shutdown().await.unwrap();

        // Assert
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read must return after shutdown")
            .unwrap();
        assert!(matches!(result, Err(EndpointError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_write() {
        // Arrange: the peer never reads, so a chunk larger than the pipe
        // buffer cannot complete
        let (halves, lifecycle, _peer) = open_halves().await;
        let lifecycle = Arc::new(lifecycle);
        let writer = {
            let halves = Arc::clone(&halves);
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { halves.write("t", &lifecycle, &[0u8; 4096]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        // Act
        let shutdown = tokio::time::timeout(Duration::from_secs(1), halves.shutdown()).await;

        // Assert
        assert!(shutdown.is_ok(), "shutdown must not wait for the stalled write");
        let result = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("write must return after shutdown")
            .unwrap();
        assert!(matches!(result, Err(EndpointError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_io_before_install_reports_not_open() {
        let halves: DuplexHalves<DuplexStream> = DuplexHalves::new();
        let lifecycle = Lifecycle::new(EndpointState::Configured);

        let result = halves.write("t", &lifecycle, b"x").await;

        assert!(matches!(result, Err(EndpointError::NotOpen { .. })));
    }
}
