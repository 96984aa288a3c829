//! Infrastructure layer for com2tcp.
//!
//! The transport adapters: everything that touches a device file or a socket.
//! Each adapter implements [`bridge_core::Endpoint`] for the bridge and
//! [`bridge_core::Configurable`] for its typed settings.
//!
//! # What does NOT belong here?
//!
//! - Parsing or validating configuration (that is the domain layer)
//! - Deciding which endpoints to build or when to stop (that is the
//!   application layer)

pub mod duplex;
pub mod serial;
pub mod tcp;

pub use duplex::DuplexHalves;
pub use serial::SerialEndpoint;
pub use tcp::{TcpClientEndpoint, TcpServerEndpoint};
