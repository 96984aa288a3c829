//! Endpoint lifecycle state and a small thread-safe cell that enforces its
//! transitions.
//!
//! Every adapter embeds a [`Lifecycle`] so the rules ("a closed endpoint is
//! never read from", "close is idempotent") are implemented once.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::error::EndpointError;

/// Lifecycle state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Created, `setup()` not yet called.
    Unconfigured,
    /// Parameters validated and stored; no OS resource held yet.
    Configured,
    /// Resource acquired; reads and writes are allowed.
    Open,
    /// Released by `close()`.  Terminal.
    Closed,
    /// A transport error occurred.  Terminal until closed.
    Failed,
}

impl EndpointState {
    /// `true` for states in which I/O must be refused.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        })
    }
}

/// Thread-safe holder for an [`EndpointState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<EndpointState>,
}

impl Lifecycle {
    pub fn new(initial: EndpointState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EndpointState> {
        // The guarded value is a plain enum, so a poisoned lock still holds a
        // valid state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> EndpointState {
        *self.lock()
    }

    /// Records a successful `setup()`.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is already open, closed or failed.
    pub fn configure(&self, endpoint: &str) -> Result<(), EndpointError> {
        let mut state = self.lock();
        match *state {
            EndpointState::Unconfigured | EndpointState::Configured => {
                *state = EndpointState::Configured;
                Ok(())
            }
            EndpointState::Open => Err(EndpointError::configuration(
                endpoint,
                "cannot reconfigure an open endpoint",
            )),
            EndpointState::Closed | EndpointState::Failed => Err(EndpointError::closed(endpoint)),
        }
    }

    /// Checks whether `open()` has work to do.
    ///
    /// Returns `Ok(true)` when the resource must be acquired and `Ok(false)`
    /// when the endpoint is already open.
    pub fn begin_open(&self, endpoint: &str) -> Result<bool, EndpointError> {
        match *self.lock() {
            EndpointState::Unconfigured => Err(EndpointError::configuration(
                endpoint,
                "setup() has not been called",
            )),
            EndpointState::Configured => Ok(true),
            EndpointState::Open => Ok(false),
            EndpointState::Closed | EndpointState::Failed => Err(EndpointError::closed(endpoint)),
        }
    }

    /// Moves `Configured -> Open`.
    ///
    /// Returns `false` if the endpoint was closed while the resource was being
    /// acquired; the caller must then drop the resource.
    pub fn mark_open(&self) -> bool {
        let mut state = self.lock();
        if *state == EndpointState::Configured {
            *state = EndpointState::Open;
            true
        } else {
            false
        }
    }

    /// Fails unless the endpoint is open.
    pub fn ensure_open(&self, endpoint: &str) -> Result<(), EndpointError> {
        match *self.lock() {
            EndpointState::Open => Ok(()),
            EndpointState::Closed | EndpointState::Failed => Err(EndpointError::closed(endpoint)),
            EndpointState::Unconfigured | EndpointState::Configured => {
                Err(EndpointError::NotOpen {
                    endpoint: endpoint.to_string(),
                })
            }
        }
    }

    /// Moves `Open -> Failed` after a transport error.
    pub fn mark_failed(&self) {
        let mut state = self.lock();
        if *state == EndpointState::Open {
            *state = EndpointState::Failed;
        }
    }

    /// Moves any state to `Closed`.
    ///
    /// Returns `true` only for the call that performed the transition, so the
    /// caller can release resources exactly once.
    pub fn mark_closed(&self) -> bool {
        let mut state = self.lock();
        if *state == EndpointState::Closed {
            false
        } else {
            *state = EndpointState::Closed;
            true
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(EndpointState::Unconfigured)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_setup() {
        let lc = Lifecycle::default();
        let result = lc.begin_open("ep");
        assert!(matches!(result, Err(EndpointError::Configuration { .. })));
    }

    #[test]
    fn test_configured_endpoint_opens_once() {
        // Arrange
        let lc = Lifecycle::default();
        lc.configure("ep").unwrap();

        // Act
        let first = lc.begin_open("ep").unwrap();
        assert!(lc.mark_open());
        let second = lc.begin_open("ep").unwrap();

        // Assert: the second open is a no-op
        assert!(first);
        assert!(!second);
        assert_eq!(lc.get(), EndpointState::Open);
    }

    #[test]
    fn test_close_is_idempotent() {
        let lc = Lifecycle::new(EndpointState::Open);
        assert!(lc.mark_closed());
        assert!(!lc.mark_closed());
        assert_eq!(lc.get(), EndpointState::Closed);
    }

    #[test]
    fn test_closed_endpoint_rejects_io_and_reopen() {
        let lc = Lifecycle::new(EndpointState::Open);
        lc.mark_closed();

        assert!(matches!(lc.ensure_open("ep"), Err(EndpointError::Closed { .. })));
        assert!(matches!(lc.begin_open("ep"), Err(EndpointError::Closed { .. })));
    }

    #[test]
    fn test_failed_endpoint_rejects_io() {
        let lc = Lifecycle::new(EndpointState::Open);
        lc.mark_failed();
        assert_eq!(lc.get(), EndpointState::Failed);
        assert!(matches!(lc.ensure_open("ep"), Err(EndpointError::Closed { .. })));
    }

    #[test]
    fn test_unopened_endpoint_reports_not_open() {
        let lc = Lifecycle::new(EndpointState::Configured);
        assert!(matches!(lc.ensure_open("ep"), Err(EndpointError::NotOpen { .. })));
    }

    #[test]
    fn test_close_during_open_wins() {
        // Arrange: open in progress, then a concurrent close
        let lc = Lifecycle::new(EndpointState::Configured);
        assert!(lc.begin_open("ep").unwrap());
        lc.mark_closed();

        // Act / Assert: the opener learns it must discard the resource
        assert!(!lc.mark_open());
        assert_eq!(lc.get(), EndpointState::Closed);
    }

    #[test]
    fn test_cannot_reconfigure_open_endpoint() {
        let lc = Lifecycle::new(EndpointState::Open);
        assert!(lc.configure("ep").is_err());
    }
}
