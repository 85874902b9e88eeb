//! Command timeout guard
//!
//! Races an operation against a deadline. The operation runs as its own task, so a
//! deadline that fires first does not cancel it: the late result is dropped on the floor.
//! This is the only cancellation primitive in the client.

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

/// How a guarded operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// Operation finished before the deadline
    Settled(T),
    /// Deadline fired first; `on_timeout` has run
    TimedOut,
    /// Operation task panicked
    Failed(String),
}

impl<T> GuardOutcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, GuardOutcome::TimedOut)
    }
}

/// Run `operation` with a deadline
///
/// `on_timeout` runs exactly once, only when the deadline wins.
pub async fn guard<F, T, C>(deadline: Duration, operation: F, on_timeout: C) -> GuardOutcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
    C: FnOnce(),
{
    let mut handle = tokio::spawn(operation);

    tokio::select! {
        joined = &mut handle => match joined {
            Ok(value) => GuardOutcome::Settled(value),
            Err(e) => {
                error!("Guarded operation failed: {}", e);
                GuardOutcome::Failed(e.to_string())
            }
        },
        _ = tokio::time::sleep(deadline) => {
            warn!("Guarded operation exceeded {:?}", deadline);
            on_timeout();
            GuardOutcome::TimedOut
        }
    }
}
