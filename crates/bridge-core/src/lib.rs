//! # bridge-core
//!
//! Transport-independent core of the stream bridge: the endpoint contract, the
//! bridge orchestrator and the forwarding engine that copies bytes between two
//! endpoints.
//!
//! This crate knows nothing about serial ports or sockets.  Concrete transports
//! live in the application crate and plug in through the [`Endpoint`] trait.
//!
//! # Architecture overview (for beginners)
//!
//! A *bridge* joins two byte streams.  Whatever arrives on the input endpoint
//! is written, unchanged and in order, to the output endpoint.  When both
//! endpoints can read and write, the opposite direction is forwarded too.
//!
//! - **`endpoint`** – The contract every transport implements (`open`,
//!   `read_chunk`, `write_chunk`, `close`), its lifecycle state machine and an
//!   in-memory [`MockEndpoint`] for tests.
//!
//! - **`bridge`** – The [`Bridge`] orchestrator.  It binds two endpoints,
//!   opens them, spawns one forwarding task per direction and makes sure both
//!   endpoints are closed exactly once, whether the bridge is closed by its
//!   owner, a stream ends, or a transport fails.
//!
//! - **`error`** – [`EndpointError`] and [`BridgeError`].

pub mod bridge;
pub mod endpoint;
pub mod error;

// Re-export the most-used types at the crate root so callers can write
// `bridge_core::Bridge` instead of `bridge_core::bridge::Bridge`.
pub use bridge::{
    Bridge, BridgeOptions, BridgeState, Direction, ForwardingMode, Role, Termination,
    DEFAULT_CHUNK_SIZE, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use endpoint::mock::MockEndpoint;
pub use endpoint::{
    Capability, Configurable, Endpoint, EndpointKind, EndpointState, Lifecycle, ReadOutcome,
};
pub use error::{BridgeError, EndpointError};
