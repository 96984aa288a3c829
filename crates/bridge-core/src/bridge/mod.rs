//! The bridge orchestrator.
//!
//! A [`Bridge`] owns one input-capable and one output-capable endpoint, opens
//! them together, runs the forwarding engine between them and tears both down
//! exactly once, however the bridge ends.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use bridge_core::{Bridge, BridgeOptions, EndpointKind, MockEndpoint};
//!
//! # async fn example() -> Result<(), bridge_core::BridgeError> {
//! let a = MockEndpoint::new("a", EndpointKind::Input);
//! let b = MockEndpoint::new("b", EndpointKind::Output);
//!
//! let mut bridge = Bridge::new(BridgeOptions::default());
//! bridge.set_in(Arc::new(a.clone()))?;
//! bridge.set_out(Arc::new(b.clone()))?;
//! bridge.start().await?;
//!
//! a.push(b"PING");
//! assert_eq!(b.wait_for_sink(4).await, b"PING");
//!
//! let cause = bridge.close().await;
//! println!("bridge stopped: {cause}");
//! # Ok(())
//! # }
//! ```
//!
//! # Shutdown latency
//!
//! The stop signal is raced against every pending read and write, so a
//! well-behaved forwarding task exits immediately.  A task that has not exited
//! after [`BridgeOptions::shutdown_timeout`] is aborted.  `close()` therefore
//! returns within `shutdown_timeout` plus the time both endpoints need to
//! close.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::endpoint::Endpoint;
use crate::error::{BridgeError, EndpointError};

mod forward;
pub mod state;
mod supervisor;

pub use state::{BridgeState, Direction, Role, Termination};

/// Default size of the per-direction chunk buffer.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default bound on how long `close()` waits for forwarding tasks.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Which directions the forwarding engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingMode {
    /// Forward input → output, and also output → input when the input endpoint
    /// can write and the output endpoint can read.
    #[default]
    Auto,
    /// Forward input → output only.
    OneWay,
}

/// Tuning knobs for a [`Bridge`].
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub mode: ForwardingMode,
    /// Largest chunk read from a source in one call.
    pub chunk_size: usize,
    /// How long shutdown waits for forwarding tasks before aborting them.
    pub shutdown_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            mode: ForwardingMode::Auto,
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// State shared between the bridge handle and its supervisor task.
pub(crate) struct Shared {
    pub(crate) state: state::StateCell,
    pub(crate) stop: watch::Sender<bool>,
    termination: Mutex<Option<Termination>>,
}

impl Shared {
    fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            state: state::StateCell::new(),
            stop,
            termination: Mutex::new(None),
        }
    }

    /// Records the termination cause unless one is already recorded.
    pub(crate) fn record(&self, termination: Termination) {
        let mut slot = self
            .termination
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(termination);
        }
    }

    pub(crate) fn termination(&self) -> Option<Termination> {
        self.termination
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Closes whichever endpoints are present.  A failure closing one endpoint is
/// logged and does not prevent closing the other.
pub(crate) async fn teardown(
    input: Option<&Arc<dyn Endpoint>>,
    output: Option<&Arc<dyn Endpoint>>,
) {
    for endpoint in [input, output].into_iter().flatten() {
        match endpoint.close().await {
            Ok(()) => info!(endpoint = endpoint.name(), "endpoint closed"),
            Err(e) => warn!(endpoint = endpoint.name(), "error while closing endpoint: {e}"),
        }
    }
}

/// Orchestrates two endpoints and the forwarding tasks between them.
///
/// Control operations (`start`, `close`) are serialised internally, so a
/// `Bridge` wrapped in an `Arc` can be closed from any task, including while
/// `start()` is still opening endpoints.
pub struct Bridge {
    id: Uuid,
    options: BridgeOptions,
    input: Option<Arc<dyn Endpoint>>,
    output: Option<Arc<dyn Endpoint>>,
    shared: Arc<Shared>,
    /// Supervisor task of a running bridge.  The async mutex also serialises
    /// `start()` against `close()`.
    supervisor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            options,
            input: None,
            output: None,
            shared: Arc::new(Shared::new()),
            supervisor: tokio::sync::Mutex::new(None),
        }
    }

    /// Unique id of this bridge, attached to every log event it emits.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> BridgeState {
        self.shared.state.get()
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// The recorded termination cause, once the bridge has begun shutting down.
    pub fn termination(&self) -> Option<Termination> {
        self.shared.termination()
    }

    /// Binds the endpoint data is read from.
    ///
    /// # Errors
    ///
    /// [`BridgeError::State`] after `start()`; [`BridgeError::Capability`] if
    /// the endpoint cannot be read from.
    pub fn set_in(&mut self, endpoint: Arc<dyn Endpoint>) -> Result<(), BridgeError> {
        self.bind(Role::Input, endpoint)
    }

    /// Binds the endpoint data is written to.
    ///
    /// # Errors
    ///
    /// [`BridgeError::State`] after `start()`; [`BridgeError::Capability`] if
    /// the endpoint cannot be written to.
    pub fn set_out(&mut self, endpoint: Arc<dyn Endpoint>) -> Result<(), BridgeError> {
        self.bind(Role::Output, endpoint)
    }

    fn bind(&mut self, role: Role, endpoint: Arc<dyn Endpoint>) -> Result<(), BridgeError> {
        let state = self.state();
        if !matches!(state, BridgeState::Idle | BridgeState::Configured) {
            return Err(BridgeError::state("bind an endpoint", state));
        }

        let kind = endpoint.kind();
        let capable = match role {
            Role::Input => kind.can_read(),
            Role::Output => kind.can_write(),
        };
        if !capable {
            return Err(BridgeError::Capability {
                role,
                endpoint: endpoint.name().to_string(),
                kind,
            });
        }

        match role {
            Role::Input => self.input = Some(endpoint),
            Role::Output => self.output = Some(endpoint),
        }
        self.shared
            .state
            .transition(&[BridgeState::Idle], BridgeState::Configured);
        Ok(())
    }

    /// Opens both endpoints and starts forwarding.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::MissingEndpoint`] if an endpoint is not bound.
    /// - [`BridgeError::State`] if the bridge was already started or closed.
    /// - [`BridgeError::Start`] if an endpoint fails to open.  Both endpoints
    ///   are closed again and the bridge is left `Closed`.
    /// - [`BridgeError::Cancelled`] if `close()` was called before the
    ///   endpoints finished opening.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut supervisor = self.supervisor.lock().await;

        let state = self.state();
        if state != BridgeState::Configured && state != BridgeState::Idle {
            return Err(BridgeError::state("start", state));
        }
        let input = self
            .input
            .clone()
            .ok_or(BridgeError::MissingEndpoint { role: Role::Input })?;
        let output = self
            .output
            .clone()
            .ok_or(BridgeError::MissingEndpoint { role: Role::Output })?;

        if !self
            .shared
            .state
            .transition(&[BridgeState::Configured], BridgeState::Starting)
        {
            return Err(BridgeError::state("start", self.state()));
        }

        let span = info_span!("bridge", id = %self.id);
        info!(
            parent: &span,
            input = input.name(),
            output = output.name(),
            "starting bridge"
        );

        if let Err(e) = input.open().await {
            return Err(self.abort_start(Role::Input, e, &input, &output).await);
        }
        if let Err(e) = output.open().await {
            return Err(self.abort_start(Role::Output, e, &input, &output).await);
        }
        if !self
            .shared
            .state
            .transition(&[BridgeState::Starting], BridgeState::Running)
        {
            // close() won the race and has already closed both endpoints.
            info!(parent: &span, "bridge closed while starting");
            return Err(BridgeError::Cancelled);
        }

        let reverse = self.options.mode == ForwardingMode::Auto
            && input.kind().can_write()
            && output.kind().can_read();
        let chunk_size = self.options.chunk_size.max(1);

        let mut workers = vec![(
            Direction::Forward,
            tokio::spawn(
                forward::forward(
                    Direction::Forward,
                    Arc::clone(&input),
                    Arc::clone(&output),
                    self.shared.stop.subscribe(),
                    chunk_size,
                )
                .instrument(info_span!(parent: &span, "forward", direction = %Direction::Forward)),
            ),
        )];
        if reverse {
            workers.push((
                Direction::Reverse,
                tokio::spawn(
                    forward::forward(
                        Direction::Reverse,
                        Arc::clone(&output),
                        Arc::clone(&input),
                        self.shared.stop.subscribe(),
                        chunk_size,
                    )
                    .instrument(
                        info_span!(parent: &span, "forward", direction = %Direction::Reverse),
                    ),
                ),
            ));
        }

        info!(
            parent: &span,
            bidirectional = reverse,
            "bridge running"
        );

        *supervisor = Some(tokio::spawn(
            supervisor::supervise(
                Arc::clone(&self.shared),
                workers,
                input,
                output,
                self.options.shutdown_timeout,
            )
            .instrument(span),
        ));
        Ok(())
    }

    /// Unwinds a failed `start()`: closes both endpoints and ends `Closed`.
    ///
    /// When `close()` already claimed the teardown, the open most likely
    /// failed because its endpoint was closed under it, and nothing is closed
    /// a second time.
    async fn abort_start(
        &self,
        role: Role,
        cause: EndpointError,
        input: &Arc<dyn Endpoint>,
        output: &Arc<dyn Endpoint>,
    ) -> BridgeError {
        if !self
            .shared
            .state
            .transition(&[BridgeState::Starting], BridgeState::Stopping)
        {
            debug!(bridge = %self.id, "{role} endpoint open interrupted by close: {cause}");
            return BridgeError::Cancelled;
        }
        error!(bridge = %self.id, "failed to open {role} endpoint: {cause}");
        self.shared.record(Termination::NotStarted);
        teardown(Some(input), Some(output)).await;
        self.shared
            .state
            .transition(&[BridgeState::Stopping], BridgeState::Closed);
        BridgeError::Start {
            role,
            source: cause,
        }
    }

    /// Stops forwarding, closes both endpoints and returns why the bridge
    /// ended.
    ///
    /// Idempotent: later calls return the same cause without closing anything
    /// again.  Safe to call concurrently with running forwarding tasks, with
    /// other `close()` calls and with a `start()` that is still opening
    /// endpoints.
    pub async fn close(&self) -> Termination {
        // start() holds the supervisor lock while it opens endpoints, and an
        // open may wait indefinitely (a listener with no peer).  Closing the
        // endpoints first makes that open return so start() can unwind.
        self.cancel_start().await;

        let mut supervisor = self.supervisor.lock().await;

        match self.state() {
            BridgeState::Idle | BridgeState::Configured => {
                if self.shared.state.transition(
                    &[BridgeState::Idle, BridgeState::Configured],
                    BridgeState::Stopping,
                ) {
                    self.shared.record(Termination::NotStarted);
                    teardown(self.input.as_ref(), self.output.as_ref()).await;
                    self.shared
                        .state
                        .transition(&[BridgeState::Stopping], BridgeState::Closed);
                    info!(bridge = %self.id, "bridge closed before start");
                }
            }
            BridgeState::Running | BridgeState::Stopping => {
                self.shared.record(Termination::Requested);
                self.shared.stop.send_replace(true);
            }
            // A start() future dropped part-way through leaves `Starting`
            // behind.
            BridgeState::Starting => {
                self.cancel_start().await;
            }
            BridgeState::Closed => {}
        }

        if let Some(handle) = supervisor.take() {
            if let Err(e) = handle.await {
                error!(bridge = %self.id, "bridge supervisor failed: {e}");
                teardown(self.input.as_ref(), self.output.as_ref()).await;
                self.shared.state.transition(
                    &[BridgeState::Running, BridgeState::Stopping],
                    BridgeState::Closed,
                );
            }
        }
        drop(supervisor);

        // A concurrent close() may still be tearing down.
        self.wait().await
    }

    /// Claims the teardown of a bridge that is still `Starting` and closes
    /// both endpoints.  Does nothing in any other state.
    async fn cancel_start(&self) {
        if self
            .shared
            .state
            .transition(&[BridgeState::Starting], BridgeState::Stopping)
        {
            info!(bridge = %self.id, "close requested while starting");
            self.shared.record(Termination::NotStarted);
            teardown(self.input.as_ref(), self.output.as_ref()).await;
            self.shared
                .state
                .transition(&[BridgeState::Stopping], BridgeState::Closed);
        }
    }

    /// Waits until the bridge reaches `Closed`, whether through `close()` or
    /// because forwarding ended on its own, and returns the cause.
    ///
    /// Never resolves for a bridge that is never started or closed.
    pub async fn wait(&self) -> Termination {
        let mut state = self.shared.state.subscribe();
        let _ = state.wait_for(|s| *s == BridgeState::Closed).await;
        self.shared.termination().unwrap_or(Termination::Requested)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // The supervisor keeps running on its own and tears the endpoints
        // down once the stop signal is seen.
        if matches!(self.state(), BridgeState::Running) {
            self.shared.stop.send_replace(true);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
