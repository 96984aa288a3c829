//! com2tcp: serial port ↔ TCP bridge, entry point.
//!
//! Opens a serial device and a TCP connection and copies bytes between them
//! until Ctrl+C is pressed, either side closes, or a transport fails.
//!
//! # Usage
//!
//! ```text
//! com2tcp [OPTIONS]
//!
//! Options:
//!   -d, --debug                  Enable debug logs
//!   -c, --com <PATH>             Serial device
//!   -b, --baud-rate <BAUD>       Serial baud rate [default: 9600]
//!   -s, --server <HOST>          TCP host (bind address with --listen) [default: localhost]
//!   -p, --port <PORT>            TCP port [default: 8001]
//!       --listen                 Wait for one TCP peer instead of connecting
//!       --one-way                Forward serial → TCP only
//!       --connect-timeout <SECS> TCP connect timeout [default: 10]
//!       --shutdown-timeout <MS>  Bound on shutdown of the forwarding tasks [default: 2000]
//!       --config <FILE>          TOML configuration file
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be given as an environment variable.  Command-line
//! flags win over environment variables, which win over the config file,
//! which wins over the built-in defaults.
//!
//! | Variable                    | Option               |
//! |-----------------------------|----------------------|
//! | `COM2TCP_DEBUG`             | `--debug`            |
//! | `COM2TCP_COM`               | `--com`              |
//! | `COM2TCP_BAUD_RATE`         | `--baud-rate`        |
//! | `COM2TCP_SERVER`            | `--server`           |
//! | `COM2TCP_PORT`              | `--port`             |
//! | `COM2TCP_LISTEN`            | `--listen`           |
//! | `COM2TCP_ONE_WAY`           | `--one-way`          |
//! | `COM2TCP_CONNECT_TIMEOUT`   | `--connect-timeout`  |
//! | `COM2TCP_SHUTDOWN_TIMEOUT`  | `--shutdown-timeout` |
//! | `COM2TCP_CONFIG`            | `--config`           |
//!
//! # Exit codes
//!
//! - `0`: stopped by Ctrl+C or because a side closed its stream.
//! - `1`: could not start (bad configuration, device or host unreachable).
//! - `2`: stopped because forwarding failed.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use com2tcp::application::{build_bridge, exit_code, run};
use com2tcp::domain::{AppConfig, TcpMode};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial port to TCP bridge.
///
/// Values left out here fall back to the `--config` file, then to the
/// built-in defaults, which is why most fields are `Option`s.
#[derive(Debug, Parser)]
#[command(name = "com2tcp", about = "Bridges a serial port to a TCP connection", version)]
struct Cli {
    /// Enable debug logs (ignored when RUST_LOG is set).
    #[arg(short = 'd', long, env = "COM2TCP_DEBUG")]
    debug: bool,

    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    #[arg(short = 'c', long = "com", value_name = "PATH", env = "COM2TCP_COM")]
    com: Option<String>,

    /// Serial baud rate [default: 9600].
    #[arg(short = 'b', long, value_name = "BAUD", env = "COM2TCP_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// TCP host to connect to, or address to bind with --listen
    /// [default: localhost].
    #[arg(short = 's', long, value_name = "HOST", env = "COM2TCP_SERVER")]
    server: Option<String>,

    /// TCP port [default: 8001].
    #[arg(short = 'p', long, value_name = "PORT", env = "COM2TCP_PORT")]
    port: Option<u16>,

    /// Wait for one TCP peer instead of connecting out.
    #[arg(long, env = "COM2TCP_LISTEN")]
    listen: bool,

    /// Forward serial → TCP only.
    #[arg(long, env = "COM2TCP_ONE_WAY")]
    one_way: bool,

    /// Seconds allowed for the TCP connection to be established [default: 10].
    #[arg(long, value_name = "SECS", env = "COM2TCP_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Milliseconds the forwarding tasks get to stop before they are aborted
    /// [default: 2000].
    #[arg(long, value_name = "MS", env = "COM2TCP_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,

    /// TOML configuration file.
    #[arg(long, value_name = "FILE", env = "COM2TCP_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file (if any) and applies the command-line overrides
    /// on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)
                .with_context(|| format!("cannot load config file '{}'", path.display()))?,
            None => AppConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    fn apply_to(self, config: &mut AppConfig) {
        if let Some(com) = self.com {
            config.serial.device = com;
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(server) = self.server {
            config.tcp.host = server;
        }
        if let Some(port) = self.port {
            config.tcp.port = port;
        }
        if self.listen {
            config.tcp.mode = TcpMode::Listen;
        }
        if self.one_way {
            config.bridge.one_way = true;
        }
        if let Some(secs) = self.connect_timeout {
            config.tcp.connect_timeout_secs = secs;
        }
        if let Some(ms) = self.shutdown_timeout {
            config.bridge.shutdown_timeout_ms = ms;
        }
    }
}

/// Builds the log filter: `RUST_LOG` if set, otherwise `debug` with
/// `--debug` and `warn` without.
fn log_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }))
}

/// Resolves when the user presses Ctrl+C.  If the signal handler cannot be
/// installed the bridge simply runs until it stops on its own.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C signal: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed with `clap` into a [`Cli`] struct.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over `--debug`.
/// 3. The config file and CLI overrides are merged and validated.
/// 4. The serial and TCP endpoints are built and bound to a bridge.
/// 5. The bridge runs until Ctrl+C, end-of-stream, or a failure.
///
/// A startup error is returned from `main`, which prints it and exits with
/// code 1.
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.debug))
        .init();

    let config = cli.into_app_config()?;
    let settings = config.validate().context("invalid configuration")?;

    info!(
        serial = %settings.serial.device,
        baud_rate = settings.serial.baud_rate,
        tcp = %format!("{}:{}", settings.tcp.host, settings.tcp.port),
        mode = ?settings.tcp.mode,
        "starting com2tcp"
    );

    let bridge = build_bridge(&settings)?;
    let cause = run(bridge, ctrl_c()).await?;

    info!("com2tcp stopped: {cause}");
    Ok(ExitCode::from(exit_code(&cause)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn merged(args: &[&str]) -> AppConfig {
        Cli::parse_from(args).into_app_config().unwrap()
    }

    #[test]
    fn test_cli_defaults_leave_config_defaults() {
        // Arrange / Act: no arguments at all
        let config = merged(&["com2tcp"]);

        // Assert
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.tcp.host, "localhost");
        assert_eq!(config.tcp.port, 8001);
        assert_eq!(config.tcp.mode, TcpMode::Connect);
    }

    #[test]
    fn test_cli_debug_flag_short_form() {
        let cli = Cli::parse_from(["com2tcp", "-d"]);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_short_flags_override_defaults() {
        // Arrange
        let config = merged(&[
            "com2tcp", "-c", "/dev/ttyS1", "-b", "115200", "-s", "10.0.0.5", "-p", "9000",
        ]);

        // Assert
        assert_eq!(config.serial.device, "/dev/ttyS1");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.tcp.host, "10.0.0.5");
        assert_eq!(config.tcp.port, 9000);
    }

    #[test]
    fn test_cli_long_flags_override_defaults() {
        let config = merged(&[
            "com2tcp",
            "--com",
            "COM3",
            "--baud-rate",
            "19200",
            "--server",
            "example.org",
            "--port",
            "23",
        ]);
        assert_eq!(config.serial.device, "COM3");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.tcp.host, "example.org");
        assert_eq!(config.tcp.port, 23);
    }

    #[test]
    fn test_cli_listen_and_one_way() {
        let config = merged(&["com2tcp", "--listen", "--one-way"]);
        assert_eq!(config.tcp.mode, TcpMode::Listen);
        assert!(config.bridge.one_way);
    }

    #[test]
    fn test_cli_timeouts() {
        let config = merged(&[
            "com2tcp",
            "-c",
            "COM1",
            "--connect-timeout",
            "3",
            "--shutdown-timeout",
            "500",
        ]);
        let settings = config.validate().unwrap();
        assert_eq!(settings.tcp.connect_timeout, Duration::from_secs(3));
        assert_eq!(settings.bridge.shutdown_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_cli_overrides_config_file_values() {
        // Arrange: a file that sets a port, and a flag that sets another
        let mut config = AppConfig::from_toml("[tcp]\nport = 7000\nhost = \"filehost\"\n").unwrap();
        let cli = Cli::parse_from(["com2tcp", "-p", "7001"]);

        // Act
        cli.apply_to(&mut config);

        // Assert: the flag wins, untouched file values survive
        assert_eq!(config.tcp.port, 7001);
        assert_eq!(config.tcp.host, "filehost");
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::parse_from(["com2tcp", "--config", "/nonexistent/com2tcp.toml"]);
        assert!(cli.into_app_config().is_err());
    }

    #[test]
    fn test_missing_com_port_fails_validation() {
        let config = merged(&["com2tcp"]);
        assert!(config.validate().is_err());
    }
}
