//! Lifecycle state machine shared by the generator loops.
//!
//! ```text
//! RUNNING ──pause──▶ PAUSED ──resume──▶ RUNNING
//!    │                  │
//!    └────shutdown──────┴──▶ SHUTTING_DOWN ──(workers joined)──▶ TERMINATED
//! ```
//!
//! The status lives in a `watch` channel: workers hold receivers and wake as
//! soon as it changes, while control operations flip it without waiting for
//! any in-flight batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::time::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Running,
    Paused,
    ShuttingDown,
    Terminated,
}

impl LifecycleStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::ShuttingDown => "shutting_down",
            Self::Terminated => "terminated",
        }
    }

    const fn is_stopping(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

/// Whether a control request changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

/// A control request that is not valid in the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("generator must be paused before {action}")]
    NotPaused { action: &'static str },
    #[error("generator is shutting down")]
    ShuttingDown,
}

#[derive(Debug)]
pub struct Lifecycle {
    status: watch::Sender<LifecycleStatus>,
    degraded: AtomicBool,
}

impl Lifecycle {
    #[must_use]
    pub fn new(initial: LifecycleStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status,
            degraded: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn status(&self) -> LifecycleStatus {
        *self.status.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.subscribe()
    }

    /// `RUNNING → PAUSED`. Pausing while paused is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShuttingDown`] once shutdown has begun.
    pub fn pause(&self) -> Result<Transition, LifecycleError> {
        let mut outcome = Ok(Transition::Unchanged);
        self.status.send_if_modified(|status| match *status {
            LifecycleStatus::Running => {
                *status = LifecycleStatus::Paused;
                outcome = Ok(Transition::Changed);
                true
            }
            LifecycleStatus::Paused => false,
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => {
                outcome = Err(LifecycleError::ShuttingDown);
                false
            }
        });
        outcome
    }

    /// `PAUSED → RUNNING`. Resuming while running is a no-op success.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::ShuttingDown`] once shutdown has begun.
    pub fn resume(&self) -> Result<Transition, LifecycleError> {
        let mut outcome = Ok(Transition::Unchanged);
        self.status.send_if_modified(|status| match *status {
            LifecycleStatus::Paused => {
                *status = LifecycleStatus::Running;
                outcome = Ok(Transition::Changed);
                true
            }
            LifecycleStatus::Running => false,
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => {
                outcome = Err(LifecycleError::ShuttingDown);
                false
            }
        });
        outcome
    }

    /// Any state `→ SHUTTING_DOWN` (terminated stays terminated).
    pub fn shutdown(&self) -> Transition {
        let changed = self.status.send_if_modified(|status| {
            if status.is_stopping() {
                false
            } else {
                *status = LifecycleStatus::ShuttingDown;
                true
            }
        });
        if changed { Transition::Changed } else { Transition::Unchanged }
    }

    /// Final state once every worker has exited.
    pub fn mark_terminated(&self) {
        self.status.send_replace(LifecycleStatus::Terminated);
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Release);
    }
}

/// Why a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The target instant was reached while running.
    Elapsed,
    Paused,
    ShuttingDown,
}

/// Wait until `clock` reaches `target`, waking early on pause or shutdown.
///
/// The clock is re-read at least every `poll`, so the wait tracks an absolute
/// target and tolerates clock adjustments.
pub async fn wait_until(
    status: &mut watch::Receiver<LifecycleStatus>,
    clock: &dyn TimeSource,
    target: DateTime<Utc>,
    poll: Duration,
) -> WaitOutcome {
    loop {
        let current = *status.borrow_and_update();
        match current {
            LifecycleStatus::Running => {}
            LifecycleStatus::Paused => return WaitOutcome::Paused,
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => return WaitOutcome::ShuttingDown,
        }

        let now = clock.now();
        if now >= target {
            return WaitOutcome::Elapsed;
        }
        let remaining = (target - now).to_std().unwrap_or(Duration::ZERO).min(poll);

        tokio::select! {
            () = tokio::time::sleep(remaining) => {}
            changed = status.changed() => {
                if changed.is_err() {
                    return WaitOutcome::ShuttingDown;
                }
            }
        }
    }
}

/// Block while paused. Returns `true` once running again, `false` on shutdown.
pub async fn wait_while_paused(status: &mut watch::Receiver<LifecycleStatus>) -> bool {
    loop {
        let current = *status.borrow_and_update();
        match current {
            LifecycleStatus::Running => return true,
            LifecycleStatus::ShuttingDown | LifecycleStatus::Terminated => return false,
            LifecycleStatus::Paused => {}
        }
        if status.changed().await.is_err() {
            return false;
        }
    }
}
