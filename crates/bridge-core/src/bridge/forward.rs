//! The forwarding loop: one task per active direction.
//!
//! Each task owns a read handle on its source endpoint and a write handle on
//! its sink endpoint.  It reads one chunk, writes exactly that chunk, and
//! repeats.  The stop signal is raced against every read and every write, so a
//! task blocked on a silent serial line or a stalled socket exits as soon as
//! shutdown is requested.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::state::Direction;
use crate::endpoint::{Endpoint, ReadOutcome};
use crate::error::EndpointError;

/// How a forwarding task ended.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    /// The source reported end-of-stream.
    EndOfStream,
    /// The stop signal was observed.
    Stopped,
    /// A read or write failed.
    Failed(EndpointError),
}

/// Final report of one forwarding task.
#[derive(Debug)]
pub(crate) struct TaskReport {
    pub(crate) direction: Direction,
    pub(crate) outcome: TaskOutcome,
    pub(crate) bytes: u64,
    pub(crate) chunks: u64,
}

/// Copies chunks from `source` to `sink` until end-of-stream, an error, or
/// `stop` turns `true`.
///
/// A dropped stop sender is treated as a stop request.
pub(crate) async fn forward(
    direction: Direction,
    source: Arc<dyn Endpoint>,
    sink: Arc<dyn Endpoint>,
    mut stop: watch::Receiver<bool>,
    chunk_size: usize,
) -> TaskReport {
    let mut buf = vec![0u8; chunk_size];
    let mut bytes: u64 = 0;
    let mut chunks: u64 = 0;

    debug!(
        source = source.name(),
        sink = sink.name(),
        "forwarding task started"
    );

    let outcome = loop {
        let read = tokio::select! {
            biased;
            _ = stop.wait_for(|stop| *stop) => break TaskOutcome::Stopped,
            read = source.read_chunk(&mut buf) => read,
        };

        let n = match read {
            Ok(ReadOutcome::Data(n)) => n,
            Ok(ReadOutcome::EndOfStream) => {
                debug!(source = source.name(), "end of stream");
                break TaskOutcome::EndOfStream;
            }
            Err(e) => {
                warn!(source = source.name(), "read failed: {e}");
                break TaskOutcome::Failed(e);
            }
        };

        // Adapters never return an empty chunk, but a zero-length write would
        // be meaningless anyway.
        if n == 0 {
            continue;
        }

        let write = tokio::select! {
            biased;
            _ = stop.wait_for(|stop| *stop) => break TaskOutcome::Stopped,
            write = sink.write_chunk(&buf[..n]) => write,
        };

        if let Err(e) = write {
            warn!(sink = sink.name(), "write failed: {e}");
            break TaskOutcome::Failed(e);
        }

        bytes += n as u64;
        chunks += 1;
        trace!(len = n, total = bytes, "chunk forwarded");
    };

    debug!(bytes, chunks, ?outcome, "forwarding task finished");

    TaskReport {
        direction,
        outcome,
        bytes,
        chunks,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
