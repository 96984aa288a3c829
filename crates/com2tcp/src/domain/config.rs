//! Configuration schema, file loading and validation.
//!
//! Settings come from three places, in increasing priority:
//!
//! 1. Built-in defaults ([`AppConfig::default`]).
//! 2. An optional TOML file passed with `--config`.
//! 3. Command-line flags (and their `COM2TCP_*` environment variables).
//!
//! The merged [`AppConfig`] is then checked by [`AppConfig::validate`], which
//! turns it into the typed [`Settings`] the adapters are built from.
//!
//! # File format
//!
//! Every key is optional; missing keys keep their default value.
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyUSB0"
//! baud_rate = 115200
//! data_bits = 8
//! parity = "none"          # none | odd | even
//! stop_bits = 1
//! flow_control = "none"    # none | software | hardware
//!
//! [tcp]
//! host = "localhost"
//! port = 8001
//! mode = "connect"         # connect | listen
//! connect_timeout_secs = 10
//! # accept_timeout_secs = 30
//!
//! [bridge]
//! one_way = false
//! chunk_size = 4096
//! shutdown_timeout_ms = 2000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge_core::{BridgeOptions, ForwardingMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but not acceptable.
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration, as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub tcp: TcpConfig,
    pub bridge: BridgeConfig,
}

/// Serial line parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.  Required.
    pub device: String,
    pub baud_rate: u32,
    /// 5, 6, 7 or 8.
    pub data_bits: u8,
    pub parity: Parity,
    /// 1 or 2.
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

/// TCP side parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TcpConfig {
    /// Host to connect to, or address to bind in `listen` mode.
    pub host: String,
    pub port: u16,
    pub mode: TcpMode,
    /// Seconds allowed for the outgoing connection to be established.
    pub connect_timeout_secs: u64,
    /// Seconds to wait for a peer in `listen` mode.  Absent means forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_timeout_secs: Option<u64>,
}

/// Forwarding engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Forward serial → TCP only, never TCP → serial.
    pub one_way: bool,
    pub chunk_size: usize,
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Whether the TCP side dials out or waits for a peer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TcpMode {
    #[default]
    Connect,
    Listen,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mode: TcpMode::Connect,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            accept_timeout_secs: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let options = BridgeOptions::default();
        Self {
            one_way: false,
            chunk_size: options.chunk_size,
            shutdown_timeout_ms: options.shutdown_timeout.as_millis() as u64,
        }
    }
}

// ── Validated settings ────────────────────────────────────────────────────────

/// Serial parameters after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
    pub flow_control: FlowControl,
}

/// TCP parameters after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub mode: TcpMode,
    pub connect_timeout: Duration,
    pub accept_timeout: Option<Duration>,
}

/// Everything needed to build and run one bridge.
#[derive(Debug, Clone)]
pub struct Settings {
    pub serial: SerialSettings,
    pub tcp: TcpSettings,
    pub bridge: BridgeOptions,
}

impl SerialSettings {
    /// Checks the serial line parameters.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an empty device path, a zero baud rate or
    /// an unsupported number of data or stop bits.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.device.trim().is_empty() {
            return Err(ConfigError::invalid(
                "serial.device",
                "a serial device path is required (use --com)",
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::invalid("serial.baud_rate", "must be greater than 0"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(ConfigError::invalid(
                "serial.data_bits",
                format!("{} is not one of 5, 6, 7, 8", self.data_bits),
            ));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(ConfigError::invalid(
                "serial.stop_bits",
                format!("{} is not 1 or 2", self.stop_bits),
            ));
        }
        Ok(())
    }
}

impl TcpSettings {
    /// Checks the TCP parameters.
    ///
    /// Port 0 is only accepted in listen mode, where it asks the OS for an
    /// ephemeral port.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an empty host, port 0 in connect mode or
    /// a zero connect timeout.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("tcp.host", "must not be empty"));
        }
        if self.port == 0 && self.mode == TcpMode::Connect {
            return Err(ConfigError::invalid("tcp.port", "must be between 1 and 65535"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid(
                "tcp.connect_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Reads an `AppConfig` from a TOML file.
    ///
    /// Unlike a settings store, a file named on the command line must exist.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parses an `AppConfig` from TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] if the TOML is malformed or has unknown values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validates the merged configuration and converts it into [`Settings`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.  Port 0 is
    /// rejected here in both TCP modes.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let serial = SerialSettings {
            device: self.serial.device.trim().to_string(),
            baud_rate: self.serial.baud_rate,
            data_bits: self.serial.data_bits,
            parity: self.serial.parity,
            stop_bits: self.serial.stop_bits,
            flow_control: self.serial.flow_control,
        };
        serial.check()?;

        if self.tcp.port == 0 {
            return Err(ConfigError::invalid("tcp.port", "must be between 1 and 65535"));
        }
        let tcp = TcpSettings {
            host: self.tcp.host.trim().to_string(),
            port: self.tcp.port,
            mode: self.tcp.mode,
            connect_timeout: Duration::from_secs(self.tcp.connect_timeout_secs),
            accept_timeout: self.tcp.accept_timeout_secs.map(Duration::from_secs),
        };
        tcp.check()?;

        if self.bridge.chunk_size == 0 {
            return Err(ConfigError::invalid("bridge.chunk_size", "must be greater than 0"));
        }
        let bridge = BridgeOptions {
            mode: if self.bridge.one_way {
                ForwardingMode::OneWay
            } else {
                ForwardingMode::Auto
            },
            chunk_size: self.bridge.chunk_size,
            shutdown_timeout: Duration::from_millis(self.bridge.shutdown_timeout_ms),
        };

        Ok(Settings {
            serial,
            tcp,
            bridge,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
