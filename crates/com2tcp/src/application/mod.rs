//! Application layer for com2tcp.
//!
//! Knows *what* to run: builds the serial and TCP endpoints from validated
//! settings, binds them to a bridge, runs it until the user asks to stop or
//! the bridge ends on its own, and maps the outcome to an exit code.

pub mod wiring;

pub use wiring::{build_bridge, exit_code, run, EXIT_FORWARDING_FAILED};
