//! In-memory endpoint for unit and integration testing.
//!
//! [`MockEndpoint`] stands in for a serial port or socket without touching the
//! OS.  Tests feed its *source* queue with [`MockEndpoint::push`] and inspect
//! what the bridge wrote to its *sink* with [`MockEndpoint::sink_contents`] or
//! [`MockEndpoint::wait_for_sink`].  Failures can be injected at open, read,
//! write and close time, `open` can be held until the endpoint is closed, and
//! every call to `open`/`close` is counted.
//!
//! The handle is cheaply cloneable: give one clone to the bridge and keep
//! another in the test to drive and observe it.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{Endpoint, EndpointKind, EndpointState, Lifecycle, ReadOutcome};
use crate::error::EndpointError;

/// One scripted item in a mock's source queue.
#[derive(Debug, Clone)]
enum MockRead {
    Data(Vec<u8>),
    EndOfStream,
    Error(io::ErrorKind),
}

struct Source {
    rx: mpsc::UnboundedReceiver<MockRead>,
    /// Bytes of a pushed chunk that did not fit into the caller's buffer.
    pending: Vec<u8>,
}

struct Inner {
    name: String,
    kind: EndpointKind,
    lifecycle: Lifecycle,
    source_tx: mpsc::UnboundedSender<MockRead>,
    source: tokio::sync::Mutex<Source>,
    sink: watch::Sender<Vec<u8>>,
    sink_chunks: Mutex<Vec<Vec<u8>>>,
    closed: watch::Sender<bool>,
    open_error: Mutex<Option<io::ErrorKind>>,
    write_error: Mutex<Option<io::ErrorKind>>,
    close_error: Mutex<Option<io::ErrorKind>>,
    hold_open: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

/// A scriptable in-memory [`Endpoint`].
#[derive(Clone)]
pub struct MockEndpoint {
    inner: Arc<Inner>,
}

impl MockEndpoint {
    /// Creates a mock that is already configured (ready to `open()`).
    pub fn new(name: impl Into<String>, kind: EndpointKind) -> Self {
        let (source_tx, rx) = mpsc::unbounded_channel();
        let (sink, _) = watch::channel(Vec::new());
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                kind,
                lifecycle: Lifecycle::new(EndpointState::Configured),
                source_tx,
                source: tokio::sync::Mutex::new(Source {
                    rx,
                    pending: Vec::new(),
                }),
                sink,
                sink_chunks: Mutex::new(Vec::new()),
                closed,
                open_error: Mutex::new(None),
                write_error: Mutex::new(None),
                close_error: Mutex::new(None),
                hold_open: AtomicBool::new(false),
                open_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues `bytes` to be returned by a later `read_chunk`.
    ///
    /// Empty slices are ignored: a read never yields zero bytes.
    pub fn push(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let _ = self.inner.source_tx.send(MockRead::Data(bytes.to_vec()));
        }
    }

    /// Queues a graceful end-of-stream.
    pub fn push_end_of_stream(&self) {
        let _ = self.inner.source_tx.send(MockRead::EndOfStream);
    }

    /// Queues a read failure of the given kind.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        let _ = self.inner.source_tx.send(MockRead::Error(kind));
    }

    /// Makes every subsequent `open()` fail with a connection error.
    pub fn fail_open(&self, kind: io::ErrorKind) {
        *lock(&self.inner.open_error) = Some(kind);
    }

    /// Makes every subsequent `write_chunk()` fail with an I/O error.
    pub fn fail_writes(&self, kind: io::ErrorKind) {
        *lock(&self.inner.write_error) = Some(kind);
    }

    /// Makes every subsequent `open()` wait until the endpoint is closed,
    /// like a listener that never sees a peer.
    pub fn hold_open(&self) {
        self.inner.hold_open.store(true, Ordering::SeqCst);
    }

    /// Makes `close()` report an error (the endpoint still ends up closed).
    pub fn fail_close(&self, kind: io::ErrorKind) {
        *lock(&self.inner.close_error) = Some(kind);
    }

    /// All bytes written so far, concatenated.
    pub fn sink_contents(&self) -> Vec<u8> {
        self.inner.sink.borrow().clone()
    }

    /// Every `write_chunk` payload in call order.
    pub fn sink_chunks(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.sink_chunks).clone()
    }

    /// Waits until at least `len` bytes have been written, then returns the
    /// sink contents.
    pub async fn wait_for_sink(&self, len: usize) -> Vec<u8> {
        let mut rx = self.inner.sink.subscribe();
        let contents = match rx.wait_for(|bytes| bytes.len() >= len).await {
            Ok(bytes) => bytes.clone(),
            Err(_) => Vec::new(),
        };
        contents
    }

    pub fn open_calls(&self) -> usize {
        self.inner.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.get() == EndpointState::Closed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn kind(&self) -> EndpointKind {
        self.inner.kind
    }

    fn state(&self) -> EndpointState {
        self.inner.lifecycle.get()
    }

    async fn open(&self) -> Result<(), EndpointError> {
        self.inner.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.lifecycle.begin_open(&self.inner.name)? {
            return Ok(());
        }
        let open_error = *lock(&self.inner.open_error);
        if let Some(kind) = open_error {
            return Err(EndpointError::connection(&self.inner.name, kind.into()));
        }
        if self.inner.hold_open.load(Ordering::SeqCst) {
            let mut closed = self.inner.closed.subscribe();
            let _ = closed.wait_for(|c| *c).await;
        }
        if !self.inner.lifecycle.mark_open() {
            return Err(EndpointError::closed(&self.inner.name));
        }
        Ok(())
    }

    async fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, EndpointError> {
        if !self.inner.kind.can_read() {
            return Err(EndpointError::Unsupported {
                endpoint: self.inner.name.clone(),
                capability: super::Capability::Read,
            });
        }
        self.inner.lifecycle.ensure_open(&self.inner.name)?;

        let mut source = self.inner.source.lock().await;
        if source.pending.is_empty() {
            let mut closed = self.inner.closed.subscribe();
            let next = tokio::select! {
                item = source.rx.recv() => item,
                _ = closed.wait_for(|c| *c) => {
                    return Err(EndpointError::closed(&self.inner.name));
                }
            };
            match next {
                Some(MockRead::Data(bytes)) => source.pending = bytes,
                Some(MockRead::EndOfStream) | None => return Ok(ReadOutcome::EndOfStream),
                Some(MockRead::Error(kind)) => {
                    self.inner.lifecycle.mark_failed();
                    return Err(EndpointError::io(&self.inner.name, kind.into()));
                }
            }
        }

        let n = buf.len().min(source.pending.len());
        buf[..n].copy_from_slice(&source.pending[..n]);
        source.pending.drain(..n);
        Ok(ReadOutcome::Data(n))
    }

    async fn write_chunk(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        if !self.inner.kind.can_write() {
            return Err(EndpointError::Unsupported {
                endpoint: self.inner.name.clone(),
                capability: super::Capability::Write,
            });
        }
        self.inner.lifecycle.ensure_open(&self.inner.name)?;

        let write_error = *lock(&self.inner.write_error);
        if let Some(kind) = write_error {
            self.inner.lifecycle.mark_failed();
            return Err(EndpointError::io(&self.inner.name, kind.into()));
        }

        lock(&self.inner.sink_chunks).push(bytes.to_vec());
        self.inner
            .sink
            .send_modify(|sink| sink.extend_from_slice(bytes));
        Ok(())
    }

    async fn close(&self) -> Result<(), EndpointError> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.lifecycle.mark_closed() {
            self.inner.closed.send_replace(true);
        }
        let close_error = *lock(&self.inner.close_error);
        match close_error {
            Some(kind) => Err(EndpointError::io(&self.inner.name, kind.into())),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pushed_bytes_are_read_back() {
        // Arrange
        let ep = MockEndpoint::new("a", EndpointKind::Input);
        ep.open().await.unwrap();
        ep.push(b"hello");

        // Act
        let mut buf = [0u8; 16];
        let outcome = ep.read_chunk(&mut buf).await.unwrap();

        // Assert
        assert_eq!(outcome, ReadOutcome::Data(5));
        assert_eq!(&buf[..5], b"hello");
    }

    #[tokio::test]
    async fn test_oversized_chunk_is_split_across_reads() {
        let ep = MockEndpoint::new("a", EndpointKind::Input);
        ep.open().await.unwrap();
        ep.push(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(ep.read_chunk(&mut buf).await.unwrap(), ReadOutcome::Data(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(ep.read_chunk(&mut buf).await.unwrap(), ReadOutcome::Data(2));
        assert_eq!(&buf[..2], b"ef");
    }

    #[tokio::test]
    async fn test_end_of_stream_is_reported() {
        let ep = MockEndpoint::new("a", EndpointKind::Input);
        ep.open().await.unwrap();
        ep.push_end_of_stream();

        let mut buf = [0u8; 4];
        assert_eq!(
            ep.read_chunk(&mut buf).await.unwrap(),
            ReadOutcome::EndOfStream
        );
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        // Arrange: a reader blocked on an empty queue
        let ep = MockEndpoint::new("a", EndpointKind::Input);
        ep.open().await.unwrap();
        let reader = {
            let ep = ep.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                ep.read_chunk(&mut buf).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        ep.close().await.unwrap();

        // Assert: the read returns a terminal error instead of hanging
        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read must return after close")
            .unwrap();
        assert!(matches!(result, Err(EndpointError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_writes_are_recorded_per_chunk() {
        let ep = MockEndpoint::new("b", EndpointKind::Output);
        ep.open().await.unwrap();

        ep.write_chunk(b"PI").await.unwrap();
        ep.write_chunk(b"NG").await.unwrap();

        assert_eq!(ep.sink_contents(), b"PING");
        assert_eq!(ep.sink_chunks(), vec![b"PI".to_vec(), b"NG".to_vec()]);
    }

    #[tokio::test]
    async fn test_injected_open_failure() {
        let ep = MockEndpoint::new("b", EndpointKind::Output);
        ep.fail_open(io::ErrorKind::ConnectionRefused);

        let result = ep.open().await;

        assert!(matches!(result, Err(EndpointError::Connection { .. })));
        assert_eq!(ep.state(), EndpointState::Configured);
        assert_eq!(ep.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_marks_endpoint_failed() {
        let ep = MockEndpoint::new("b", EndpointKind::Output);
        ep.open().await.unwrap();
        ep.fail_writes(io::ErrorKind::BrokenPipe);

        assert!(ep.write_chunk(b"x").await.is_err());
        assert_eq!(ep.state(), EndpointState::Failed);
        // A failed endpoint refuses further I/O with a terminal error.
        assert!(matches!(
            ep.write_chunk(b"y").await,
            Err(EndpointError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn test_held_open_returns_once_closed() {
        // Arrange
        let ep = MockEndpoint::new("a", EndpointKind::Input);
        ep.hold_open();
        let opener = {
            let ep = ep.clone();
            tokio::spawn(async move { ep.open().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!opener.is_finished());

        // Act
        ep.close().await.unwrap();

        // Assert
        let result = tokio::time::timeout(Duration::from_secs(1), opener)
            .await
            .expect("open must return after close")
            .unwrap();
        assert!(matches!(result, Err(EndpointError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_close_counts_every_call() {
        let ep = MockEndpoint::new("a", EndpointKind::Bidirectional);
        ep.close().await.unwrap();
        ep.close().await.unwrap();
        assert_eq!(ep.close_calls(), 2);
        assert!(ep.is_closed());
    }
}
