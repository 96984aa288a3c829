//! Builds a serial ↔ TCP bridge from settings and runs it to completion.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use bridge_core::{Bridge, Configurable, Endpoint, Termination};

use crate::domain::{Settings, TcpMode};
use crate::infrastructure::{SerialEndpoint, TcpClientEndpoint, TcpServerEndpoint};

/// Process exit code when a forwarding direction failed.
pub const EXIT_FORWARDING_FAILED: u8 = 2;

/// Creates the TCP endpoint for the configured mode.
fn tcp_endpoint(settings: &Settings) -> anyhow::Result<Arc<dyn Endpoint>> {
    let endpoint: Arc<dyn Endpoint> = match settings.tcp.mode {
        TcpMode::Connect => {
            let mut client = TcpClientEndpoint::new();
            client
                .setup(settings.tcp.clone())
                .context("invalid TCP client settings")?;
            Arc::new(client)
        }
        TcpMode::Listen => {
            let mut server = TcpServerEndpoint::new();
            server
                .setup(settings.tcp.clone())
                .context("invalid TCP listener settings")?;
            Arc::new(server)
        }
    };
    Ok(endpoint)
}

/// Binds a serial endpoint (input) and a TCP endpoint (output) to a new,
/// not yet started bridge.
///
/// # Errors
///
/// Returns an error if either adapter rejects its settings.
pub fn build_bridge(settings: &Settings) -> anyhow::Result<Bridge> {
    let mut serial = SerialEndpoint::new();
    serial
        .setup(settings.serial.clone())
        .context("invalid serial port settings")?;
    let tcp = tcp_endpoint(settings)?;

    let mut bridge = Bridge::new(settings.bridge.clone());
    bridge.set_in(Arc::new(serial))?;
    bridge.set_out(tcp)?;
    Ok(bridge)
}

/// Starts `bridge` and runs it until `shutdown` resolves or the bridge stops
/// on its own, then closes it.
///
/// `shutdown` is polled from the start, so it also interrupts a start that is
/// still waiting for a TCP peer or a slow connect.
///
/// # Errors
///
/// Returns an error if the bridge cannot be started.  Forwarding failures
/// after a successful start are not errors; they are reported in the returned
/// [`Termination`].
pub async fn run(
    bridge: Bridge,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<Termination> {
    tokio::pin!(shutdown);

    let start = bridge.start();
    tokio::pin!(start);
    tokio::select! {
        started = &mut start => started.context("failed to start bridge")?,
        _ = &mut shutdown => {
            info!("shutdown requested while starting");
            // close() makes the pending open return; start() then unwinds.
            let (cause, _) = tokio::join!(bridge.close(), start);
            return Ok(cause);
        }
    }
    info!(bridge = %bridge.id(), "bridge started, press Ctrl+C to stop");

    let cause = tokio::select! {
        cause = bridge.wait() => cause,
        _ = &mut shutdown => {
            info!("shutdown requested");
            bridge.close().await
        }
    };

    // Joins the supervisor when the bridge ended on its own.
    bridge.close().await;

    if cause.is_failure() {
        warn!(%cause, "bridge stopped");
    } else {
        info!(%cause, "bridge stopped");
    }
    Ok(cause)
}

/// Maps how the bridge ended to a process exit code.
pub fn exit_code(cause: &Termination) -> u8 {
    if cause.is_failure() {
        EXIT_FORWARDING_FAILED
    } else {
        0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AppConfig;
    use bridge_core::{BridgeOptions, BridgeState, Direction, EndpointKind, MockEndpoint};
    use std::time::Duration;

    fn settings(mode: TcpMode) -> Settings {
        let mut cfg = AppConfig::default();
        cfg.serial.device = "/dev/ttyUSB0".to_string();
        cfg.tcp.mode = mode;
        cfg.validate().unwrap()
    }

    #[test]
    fn test_build_bridge_binds_both_endpoints() {
        let bridge = build_bridge(&settings(TcpMode::Connect)).unwrap();
        assert_eq!(bridge.state(), BridgeState::Configured);
    }

    #[test]
    fn test_build_bridge_in_listen_mode() {
        let bridge = build_bridge(&settings(TcpMode::Listen)).unwrap();
        assert_eq!(bridge.state(), BridgeState::Configured);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Termination::Requested), 0);
        assert_eq!(
            exit_code(&Termination::EndOfStream {
                direction: Direction::Forward
            }),
            0
        );
        assert_eq!(
            exit_code(&Termination::Failed {
                direction: Direction::Reverse,
                error: "reset".to_string()
            }),
            EXIT_FORWARDING_FAILED
        );
    }

    fn mock_bridge(a: &MockEndpoint, b: &MockEndpoint) -> Bridge {
        let mut bridge = Bridge::new(BridgeOptions::default());
        bridge.set_in(Arc::new(a.clone())).unwrap();
        bridge.set_out(Arc::new(b.clone())).unwrap();
        bridge
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_resolves() {
        // Arrange
        let a = MockEndpoint::new("a", EndpointKind::Input);
        let b = MockEndpoint::new("b", EndpointKind::Output);
        let bridge = mock_bridge(&a, &b);

        // Act
        let cause = run(bridge, tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();

        // Assert
        assert_eq!(cause, Termination::Requested);
        assert_eq!(a.close_calls(), 1);
        assert_eq!(b.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_when_stream_ends() {
        let a = MockEndpoint::new("a", EndpointKind::Input);
        let b = MockEndpoint::new("b", EndpointKind::Output);
        let bridge = mock_bridge(&a, &b);
        a.push_end_of_stream();

        let cause = run(bridge, std::future::pending()).await.unwrap();

        assert!(matches!(cause, Termination::EndOfStream { .. }));
    }

    #[tokio::test]
    async fn test_run_shutdown_interrupts_start_waiting_for_peer() {
        // Arrange: a listener nobody connects to, with no accept timeout
        let serial = MockEndpoint::new("serial", EndpointKind::Bidirectional);
        let mut server = TcpServerEndpoint::new();
        server
            .setup(crate::domain::TcpSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
                mode: TcpMode::Listen,
                connect_timeout: Duration::from_secs(2),
                accept_timeout: None,
            })
            .unwrap();
        let mut bridge = Bridge::new(BridgeOptions::default());
        bridge.set_in(Arc::new(serial.clone())).unwrap();
        bridge.set_out(Arc::new(server)).unwrap();

        // Act
        let cause = tokio::time::timeout(
            Duration::from_secs(3),
            run(bridge, tokio::time::sleep(Duration::from_millis(20))),
        )
        .await
        .expect("shutdown must not wait for a peer")
        .unwrap();

        // Assert
        assert_eq!(cause, Termination::NotStarted);
        assert_eq!(exit_code(&cause), 0);
        assert!(serial.is_closed());
        assert_eq!(serial.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_run_reports_start_failure_as_error() {
        let a = MockEndpoint::new("a", EndpointKind::Input);
        let b = MockEndpoint::new("b", EndpointKind::Output);
        b.fail_open(std::io::ErrorKind::ConnectionRefused);
        let bridge = mock_bridge(&a, &b);

        let result = run(bridge, std::future::pending()).await;

        assert!(result.is_err());
        assert!(a.is_closed());
    }
}
