//! Domain layer for com2tcp.
//!
//! Pure configuration types: the TOML schema, its defaults and the validation
//! that turns it into typed settings.  Nothing here opens a device or a
//! socket.

pub mod config;

pub use config::{
    AppConfig, BridgeConfig, ConfigError, FlowControl, Parity, SerialConfig, SerialSettings,
    Settings, TcpConfig, TcpMode, TcpSettings,
};
