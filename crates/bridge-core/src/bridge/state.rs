//! Bridge lifecycle types: state machine, endpoint roles, forwarding
//! directions and the recorded termination cause.

use std::fmt;

use tokio::sync::watch;

/// Lifecycle state of a [`Bridge`](super::Bridge).
///
/// ```text
/// Idle --set_in/set_out--> Configured --start()--> Starting --ok--> Running
///                                                     |               |
///                                              (error | close)  (end | error | close)
///                                                     |               v
///                                                     +----------> Stopping --> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No endpoint bound yet.
    Idle,
    /// At least one endpoint bound, `start()` not called.
    Configured,
    /// `start()` is opening the endpoints.
    Starting,
    /// Forwarding tasks are running.
    Running,
    /// Shutdown in progress: tasks are being joined, endpoints closed.
    Stopping,
    /// Terminal.
    Closed,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Configured => "configured",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Closed => "closed",
        })
    }
}

/// The slot an endpoint occupies in a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Input,
    Output,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// One direction of data flow through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input endpoint → output endpoint.
    Forward,
    /// Output endpoint → input endpoint (bidirectional bridges only).
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forward => "input->output",
            Self::Reverse => "output->input",
        })
    }
}

/// Why a bridge reached `Closed`.
///
/// Recorded once, by whichever path shuts the bridge down first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// `close()` was called before `start()` succeeded, or `start()` failed.
    NotStarted,
    /// `close()` was called while the bridge was running.
    Requested,
    /// A source endpoint reported end-of-stream.
    EndOfStream { direction: Direction },
    /// A read or write failed.  `error` is the rendered error chain.
    Failed { direction: Direction, error: String },
}

impl Termination {
    /// `true` when the bridge stopped because of a transport failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("bridge was never started"),
            Self::Requested => f.write_str("shutdown requested"),
            Self::EndOfStream { direction } => write!(f, "end of stream on {direction}"),
            Self::Failed { direction, error } => write!(f, "{direction} failed: {error}"),
        }
    }
}

/// Watched bridge state with compare-and-set transitions.
///
/// Every transition runs under the watch channel's internal lock, so a
/// concurrent `close()` and a self-triggered shutdown cannot both win the
/// `Running -> Stopping` transition.
#[derive(Debug)]
pub(crate) struct StateCell {
    tx: watch::Sender<BridgeState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(BridgeState::Idle);
        Self { tx }
    }

    pub(crate) fn get(&self) -> BridgeState {
        *self.tx.borrow()
    }

    /// Moves to `to` if the current state is one of `from`.  Returns whether
    /// the transition happened.
    pub(crate) fn transition(&self, from: &[BridgeState], to: BridgeState) -> bool {
        self.tx.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.tx.subscribe()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
