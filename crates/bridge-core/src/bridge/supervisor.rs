//! Coordinated shutdown of a running bridge.
//!
//! The supervisor task waits for the first forwarding task to finish, whatever
//! the reason (end-of-stream, error, stop signal).  It then stops the other
//! direction, gives it `shutdown_timeout` to acknowledge, aborts it if it does
//! not, closes both endpoints and marks the bridge `Closed`.
//!
//! It is the only code path that tears down a *running* bridge, which is what
//! guarantees each endpoint is closed exactly once.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::forward::{TaskOutcome, TaskReport};
use super::state::{BridgeState, Direction, Termination};
use super::{teardown, Shared};
use crate::endpoint::Endpoint;

pub(crate) type Worker = (Direction, JoinHandle<TaskReport>);

/// Waits for whichever worker finishes first and removes it from `workers`.
///
/// `workers` must not be empty.
async fn first_finished(workers: &mut Vec<Worker>) -> (Direction, Result<TaskReport, JoinError>) {
    let (index, result) = poll_fn(|cx| {
        for (index, (_, handle)) in workers.iter_mut().enumerate() {
            if let Poll::Ready(result) = Pin::new(handle).poll(cx) {
                return Poll::Ready((index, result));
            }
        }
        Poll::Pending
    })
    .await;
    let (direction, _) = workers.swap_remove(index);
    (direction, result)
}

fn termination_of(direction: Direction, result: &Result<TaskReport, JoinError>) -> Termination {
    match result {
        Ok(report) => match &report.outcome {
            TaskOutcome::EndOfStream => Termination::EndOfStream { direction },
            TaskOutcome::Stopped => Termination::Requested,
            TaskOutcome::Failed(e) => Termination::Failed {
                direction,
                error: e.to_string(),
            },
        },
        Err(e) => Termination::Failed {
            direction,
            error: format!("forwarding task did not complete: {e}"),
        },
    }
}

fn log_report(direction: Direction, result: &Result<TaskReport, JoinError>) {
    match result {
        Ok(report) => info!(
            direction = %report.direction,
            bytes = report.bytes,
            chunks = report.chunks,
            "forwarding stopped"
        ),
        Err(e) if e.is_cancelled() => warn!(%direction, "forwarding task aborted"),
        Err(e) => warn!(%direction, "forwarding task panicked: {e}"),
    }
}

pub(crate) async fn supervise(
    shared: Arc<Shared>,
    mut workers: Vec<Worker>,
    input: Arc<dyn Endpoint>,
    output: Arc<dyn Endpoint>,
    shutdown_timeout: Duration,
) {
    if workers.is_empty() {
        warn!("no forwarding task to supervise");
    } else {
        let (direction, result) = first_finished(&mut workers).await;
        log_report(direction, &result);
        shared.record(termination_of(direction, &result));
    }

    shared
        .state
        .transition(&[BridgeState::Running], BridgeState::Stopping);
    shared.stop.send_replace(true);

    // Give the remaining direction a bounded window to notice the stop signal.
    let drained = tokio::time::timeout(shutdown_timeout, async {
        while !workers.is_empty() {
            let (direction, result) = first_finished(&mut workers).await;
            log_report(direction, &result);
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = workers.len(),
            "forwarding tasks ignored stop signal for {shutdown_timeout:?}; aborting"
        );
        for (_, handle) in &workers {
            handle.abort();
        }
        for (direction, handle) in workers.drain(..) {
            let result = handle.await;
            log_report(direction, &result);
        }
    }

    teardown(Some(&input), Some(&output)).await;

    shared
        .state
        .transition(&[BridgeState::Stopping], BridgeState::Closed);
    debug!(cause = %shared.termination().unwrap_or(Termination::Requested), "bridge closed");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
