//! com2tcp library crate.
//!
//! Bridges a serial port to a TCP connection on top of `bridge-core`.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Serial device  ⇄  [com2tcp]  ⇄  TCP peer
//!
//!   ├── domain/           Config schema, defaults, validation
//!   ├── application/      Build the bridge, run it, map the exit code
//!   └── infrastructure/
//!         ├── serial      tokio-serial adapter
//!         ├── tcp         TCP client and single-peer server adapters
//!         └── duplex      Chunk read/write rules shared by both
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain`, `infrastructure` and `bridge-core`.
//! - `infrastructure` implements the `bridge-core` endpoint contract.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: bridge wiring and run loop.
pub mod application;

/// Infrastructure layer: serial and TCP endpoints.
pub mod infrastructure;
