//! Error taxonomy shared by endpoints and the bridge orchestrator.
//!
//! Errors are split by *who* raises them:
//!
//! - [`EndpointError`] is produced by transport adapters (configuration,
//!   connection, I/O, lifecycle misuse).
//! - [`BridgeError`] is produced by the orchestrator (invalid state, endpoint
//!   binding problems, start failures).
//!
//! Endpoint errors always carry the endpoint's name so a log line is enough to
//! tell which side of the bridge failed.

use thiserror::Error;

use crate::bridge::state::{BridgeState, Role};
use crate::endpoint::{Capability, EndpointKind};

/// Errors raised by an [`Endpoint`](crate::endpoint::Endpoint) implementation.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Missing or malformed transport parameters, detected at `setup()` (or at
    /// `open()` when `setup()` was never called).  Not retryable without a
    /// corrected configuration.
    #[error("endpoint {endpoint}: invalid configuration: {reason}")]
    Configuration { endpoint: String, reason: String },

    /// The underlying resource could not be acquired at `open()`: device
    /// missing or busy, connection refused, DNS failure, timeout.
    #[error("endpoint {endpoint}: connection failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// A read or write failed on an endpoint that was open.
    #[error("endpoint {endpoint}: I/O error: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint was closed (or failed earlier) and can no longer be used.
    #[error("endpoint {endpoint} is closed")]
    Closed { endpoint: String },

    /// A read or write was attempted before `open()` succeeded.
    #[error("endpoint {endpoint} is not open")]
    NotOpen { endpoint: String },

    /// The endpoint does not implement the requested capability.
    #[error("endpoint {endpoint} does not support {capability}")]
    Unsupported {
        endpoint: String,
        capability: Capability,
    },
}

impl EndpointError {
    pub fn configuration(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn connection(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn io(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn closed(endpoint: impl Into<String>) -> Self {
        Self::Closed {
            endpoint: endpoint.into(),
        }
    }
}

/// Errors raised by the [`Bridge`](crate::bridge::Bridge) orchestrator.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The operation is not valid in the bridge's current state, e.g. calling
    /// `start()` twice or binding an endpoint after `start()`.
    #[error("cannot {operation} while bridge is {state}")]
    State {
        operation: &'static str,
        state: BridgeState,
    },

    /// `start()` was called before both endpoints were bound.
    #[error("no {role} endpoint bound")]
    MissingEndpoint { role: Role },

    /// The endpoint cannot play the role it was bound to (e.g. an output-only
    /// endpoint passed to `set_in`).
    #[error("endpoint {endpoint} ({kind}) cannot be used as the {role} endpoint")]
    Capability {
        role: Role,
        endpoint: String,
        kind: EndpointKind,
    },

    /// Opening one of the endpoints failed.  Any endpoint already opened has
    /// been closed again and the bridge is `Closed`.
    #[error("failed to start bridge: {role} endpoint could not be opened")]
    Start {
        role: Role,
        #[source]
        source: EndpointError,
    },

    /// `close()` was called while `start()` was opening the endpoints.  Both
    /// endpoints have been closed and the bridge is `Closed`.
    #[error("bridge was closed while starting")]
    Cancelled,
}

impl BridgeError {
    pub(crate) fn state(operation: &'static str, state: BridgeState) -> Self {
        Self::State { operation, state }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
