//! TCP endpoints.
//!
//! - [`TcpClientEndpoint`] dials a remote host on `open()`.
//! - [`TcpServerEndpoint`] binds a port on `open()` and waits for exactly one
//!   peer.  The listener is dropped as soon as the peer is accepted.
//!
//! Both are bidirectional and disable Nagle's algorithm, since bridged serial
//! traffic is usually small, latency-sensitive chunks.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use bridge_core::{
    Configurable, Endpoint, EndpointError, EndpointKind, EndpointState, Lifecycle, ReadOutcome,
};

use super::duplex::DuplexHalves;
use crate::domain::{TcpMode, TcpSettings};

/// Shared state of both TCP endpoint flavours.
struct TcpCore {
    name: String,
    settings: Option<TcpSettings>,
    lifecycle: Lifecycle,
    io: DuplexHalves<TcpStream>,
}

impl TcpCore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            settings: None,
            lifecycle: Lifecycle::default(),
            io: DuplexHalves::new(),
        }
    }

    fn setup(&mut self, settings: TcpSettings, prefix: &str) -> Result<(), EndpointError> {
        settings
            .check()
            .map_err(|e| EndpointError::configuration(&self.name, e.to_string()))?;
        self.lifecycle.configure(&self.name)?;
        self.name = format!("{prefix}:{}:{}", settings.host, settings.port);
        debug!(endpoint = %self.name, "tcp endpoint configured");
        self.settings = Some(settings);
        Ok(())
    }

    fn settings(&self) -> Result<&TcpSettings, EndpointError> {
        self.settings
            .as_ref()
            .ok_or_else(|| EndpointError::configuration(&self.name, "setup() has not been called"))
    }

    /// Installs a connected stream and moves the endpoint to `Open`.
    async fn attach(&self, stream: TcpStream) -> Result<(), EndpointError> {
        stream
            .set_nodelay(true)
            .map_err(|e| EndpointError::connection(&self.name, e))?;
        let peer = stream.peer_addr().ok();
        self.io.install(stream).await;
        if !self.lifecycle.mark_open() {
            // Closed while connecting.
            let _ = self.io.shutdown().await;
            return Err(EndpointError::closed(&self.name));
        }
        info!(endpoint = %self.name, peer = ?peer, "tcp connection established");
        Ok(())
    }

    async fn close(&self) -> Result<(), EndpointError> {
        if !self.lifecycle.mark_closed() {
            return Ok(());
        }
        let result = self.io.shutdown().await;
        debug!(endpoint = %self.name, "tcp connection released");
        match result {
            // The peer may already have gone away; the socket is released
            // either way.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(|e| EndpointError::io(&self.name, e)),
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Connects to `host:port` when opened.
pub struct TcpClientEndpoint {
    core: TcpCore,
}

impl TcpClientEndpoint {
    pub fn new() -> Self {
        Self {
            core: TcpCore::new("tcp"),
        }
    }
}

impl Default for TcpClientEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for TcpClientEndpoint {
    type Config = TcpSettings;

    fn setup(&mut self, config: TcpSettings) -> Result<(), EndpointError> {
        if config.mode != TcpMode::Connect {
            return Err(EndpointError::configuration(
                &self.core.name,
                "a client endpoint needs connect mode",
            ));
        }
        self.core.setup(config, "tcp")
    }
}

#[async_trait]
impl Endpoint for TcpClientEndpoint {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Bidirectional
    }

    fn state(&self) -> EndpointState {
        self.core.lifecycle.get()
    }

    async fn open(&self) -> Result<(), EndpointError> {
        let core = &self.core;
        if !core.lifecycle.begin_open(&core.name)? {
            return Ok(());
        }
        let settings = core.settings()?;

        let connect = TcpStream::connect((settings.host.as_str(), settings.port));
        let stream = tokio::time::timeout(settings.connect_timeout, connect)
            .await
            .map_err(|_| {
                EndpointError::connection(
                    &core.name,
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no answer within {:?}", settings.connect_timeout),
                    ),
                )
            })?
            .map_err(|e| EndpointError::connection(&core.name, e))?;

        core.attach(stream).await
    }

    async fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, EndpointError> {
        self.core.io.read(&self.core.name, &self.core.lifecycle, buf).await
    }

    async fn write_chunk(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.core
            .io
            .write(&self.core.name, &self.core.lifecycle, bytes)
            .await
    }

    async fn close(&self) -> Result<(), EndpointError> {
        self.core.close().await
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// Binds `host:port` when opened and accepts a single peer.
pub struct TcpServerEndpoint {
    core: TcpCore,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl TcpServerEndpoint {
    pub fn new() -> Self {
        Self {
            core: TcpCore::new("tcp-listen"),
            local_addr: Mutex::new(None),
        }
    }

    /// Address the listener is bound to, once `open()` has bound it.  Useful
    /// with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn accept_one(&self, listener: &TcpListener) -> Result<TcpStream, EndpointError> {
        let core = &self.core;
        let settings = core.settings()?;

        let accept = async {
            let accepted = match settings.accept_timeout {
                Some(limit) => tokio::time::timeout(limit, listener.accept())
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no peer connected within {limit:?}"),
                        ))
                    }),
                None => listener.accept().await,
            };
            accepted.map(|(stream, _)| stream)
        };

        tokio::select! {
            accepted = accept => accepted.map_err(|e| EndpointError::connection(&core.name, e)),
            _ = core.io.wait_closed() => Err(EndpointError::closed(&core.name)),
        }
    }
}

impl Default for TcpServerEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Configurable for TcpServerEndpoint {
    type Config = TcpSettings;

    fn setup(&mut self, config: TcpSettings) -> Result<(), EndpointError> {
        if config.mode != TcpMode::Listen {
            return Err(EndpointError::configuration(
                &self.core.name,
                "a server endpoint needs listen mode",
            ));
        }
        self.core.setup(config, "tcp-listen")
    }
}

#[async_trait]
impl Endpoint for TcpServerEndpoint {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Bidirectional
    }

    fn state(&self) -> EndpointState {
        self.core.lifecycle.get()
    }

    async fn open(&self) -> Result<(), EndpointError> {
        let core = &self.core;
        if !core.lifecycle.begin_open(&core.name)? {
            return Ok(());
        }
        let settings = core.settings()?;

        let listener = TcpListener::bind((settings.host.as_str(), settings.port))
            .await
            .map_err(|e| EndpointError::connection(&core.name, e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| EndpointError::connection(&core.name, e))?;
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(bound);
        info!(endpoint = %core.name, %bound, "waiting for a tcp peer");

        let stream = self.accept_one(&listener).await?;
        drop(listener);
        core.attach(stream).await
    }

    async fn read_chunk(&self, buf: &mut [u8]) -> Result<ReadOutcome, EndpointError> {
        self.core.io.read(&self.core.name, &self.core.lifecycle, buf).await
    }

    async fn write_chunk(&self, bytes: &[u8]) -> Result<(), EndpointError> {
        self.core
            .io
            .write(&self.core.name, &self.core.lifecycle, bytes)
            .await
    }

    async fn close(&self) -> Result<(), EndpointError> {
        self.core.close().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
