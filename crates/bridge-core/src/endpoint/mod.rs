//! The endpoint contract: what an adapter must provide so the bridge can stay
//! transport-agnostic.
//!
//! An endpoint is one side of a bridge.  It may be a byte *source* (input), a
//! byte *sink* (output), or both.  Concrete adapters (serial port, TCP socket,
//! in-memory mock) implement [`Endpoint`]; the orchestrator only ever talks to
//! the trait.
//!
//! # Lifecycle
//!
//! ```text
//! Unconfigured --setup()--> Configured --open()--> Open --close()--> Closed
//!                                                   |
//!                                                   +--I/O error--> Failed
//! ```
//!
//! `close()` is idempotent and valid from every state.  A `Closed` or `Failed`
//! endpoint rejects every read and write with [`EndpointError::Closed`] instead
//! of blocking.
//!
//! # Concurrency
//!
//! All methods take `&self`.  In a bidirectional bridge one task reads from an
//! endpoint while another task writes to it, so adapters keep their read and
//! write halves behind separate locks.  At most one task reads and at most one
//! task writes a given endpoint.

use std::fmt;

use async_trait::async_trait;

use crate::error::EndpointError;

pub mod mock;
pub mod state;

pub use state::{EndpointState, Lifecycle};

/// Which capabilities an endpoint implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Byte source only.
    Input,
    /// Byte sink only.
    Output,
    /// Both source and sink (serial ports, sockets).
    Bidirectional,
}

impl EndpointKind {
    pub fn can_read(self) -> bool {
        matches!(self, Self::Input | Self::Bidirectional)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Self::Output | Self::Bidirectional)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Bidirectional => "bidirectional",
        })
    }
}

/// A single capability, used in [`EndpointError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Write,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "reading",
            Self::Write => "writing",
        })
    }
}

/// Result of a successful [`Endpoint::read_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes (always `n > 0`) were written to the front of the buffer.
    Data(usize),
    /// The remote side closed the stream gracefully.
    EndOfStream,
}

/// Capability interface implemented by every transport adapter.
///
/// Adapters implement `read_chunk` and/or `write_chunk` according to their
/// [`kind`](Endpoint::kind); the default implementations report the
/// capability as unsupported.
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Human-readable identifier used in log events and errors, for example
    /// `serial:/dev/ttyUSB0` or `tcp:localhost:8001`.
    fn name(&self) -> &str;

    fn kind(&self) -> EndpointKind;

    fn state(&self) -> EndpointState;

    /// Acquires the underlying OS or network resource.
    ///
    /// Calling `open()` on an endpoint that is already open is a no-op.  An
    /// endpoint that has been closed cannot be reopened.
    async fn open(&self) -> Result<(), EndpointError>;

    /// Waits until at least one byte is available and copies it into `buf`.
    async fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, EndpointError> {
        let _ = buf;
        Err(EndpointError::Unsupported {
            endpoint: self.name().to_string(),
            capability: Capability::Read,
        })
    }

    /// Writes every byte of `bytes` or fails.  Partial writes are retried by
    /// the adapter; callers never see them.
    async fn write_chunk(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        let _ = bytes;
        Err(EndpointError::Unsupported {
            endpoint: self.name().to_string(),
            capability: Capability::Write,
        })
    }

    /// Releases the underlying resource.  Idempotent.
    async fn close(&self) -> Result<(), EndpointError>;
}

/// Transport-specific configuration step, run before the endpoint is handed to
/// a bridge.
///
/// Kept separate from [`Endpoint`] so the latter stays object-safe: each
/// adapter has its own configuration type.
pub trait Configurable {
    type Config;

    /// Validates and stores `config`.  Does not acquire OS resources.
    fn setup(&mut self, config: Self::Config) -> Result<(), EndpointError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct SinkOnly {
        lifecycle: Lifecycle,
    }

    #[async_trait]
    impl Endpoint for SinkOnly {
        fn name(&self) -> &str {
            "sink-only"
        }

        fn kind(&self) -> EndpointKind {
            EndpointKind::Output
        }

        fn state(&self) -> EndpointState {
            self.lifecycle.get()
        }

        async fn open(&self) -> Result<(), EndpointError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), EndpointError> {
            self.lifecycle.mark_closed();
            Ok(())
        }
    }

    #[test]
    fn test_kind_capabilities() {
        assert!(EndpointKind::Input.can_read());
        assert!(!EndpointKind::Input.can_write());
        assert!(EndpointKind::Output.can_write());
        assert!(!EndpointKind::Output.can_read());
        assert!(EndpointKind::Bidirectional.can_read());
        assert!(EndpointKind::Bidirectional.can_write());
    }

    #[tokio::test]
    async fn test_default_read_chunk_reports_unsupported() {
        let ep = SinkOnly {
            lifecycle: Lifecycle::new(EndpointState::Configured),
        };
        let mut buf = [0u8; 8];

        let result = ep.read_chunk(&mut buf).await;

        assert!(matches!(
            result,
            Err(EndpointError::Unsupported {
                capability: Capability::Read,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_default_write_chunk_reports_unsupported_for_input_adapter() {
        struct SourceOnly;

        #[async_trait]
        impl Endpoint for SourceOnly {
            fn name(&self) -> &str {
                "source-only"
            }
            fn kind(&self) -> EndpointKind {
                EndpointKind::Input
            }
            fn state(&self) -> EndpointState {
                EndpointState::Open
            }
            async fn open(&self) -> Result<(), EndpointError> {
                Ok(())
            }
            async fn close(&self) -> Result<(), EndpointError> {
                Ok(())
            }
        }

        let result = SourceOnly.write_chunk(b"x").await;
        assert!(matches!(
            result,
            Err(EndpointError::Unsupported {
                capability: Capability::Write,
                ..
            })
        ));
    }
}
