//! # Shutdown gate: admission and drain of in-flight operations.
//!
//! [`ShutdownGate`] counts operations that are in flight (open stream
//! sessions, request handlers, background jobs) and refuses new ones once the
//! process starts draining.
//!
//! ## Flow
//! ```text
//! try_begin() ──► draining? ── yes ──► None
//!                    │ no
//!                    ▼
//!              register token
//!                    │
//!               draining? ── yes ──► drop token ──► None
//!                    │ no
//!                    ▼
//!               Some(Permit) ── end() / drop ──► token released
//!
//! shutdown(grace) ──► draining = true ──► tracker.close()
//!                 └─► wait for all tokens (≤ grace)
//!                        ├─ drained      → Ok(())
//!                        └─ grace passed → GateError::GraceExceeded { in_flight }
//! ```
//!
//! ## Rules
//! - No permit is ever granted after `shutdown` has set the draining flag, even
//!   when `try_begin` races with it: the flag is checked before and after the
//!   operation is registered.
//! - Draining is one-way; a gate is not reopened.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

use super::signal::wait_for_shutdown_signal;
use crate::error::GateError;

#[derive(Debug, Default)]
struct Inner {
    tracker: TaskTracker,
    draining: AtomicBool,
}

/// Process-wide in-flight operation counter gating new work during drain.
///
/// Cloning is cheap; clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct ShutdownGate {
    inner: Arc<Inner>,
}

/// Proof that an operation was admitted by a [`ShutdownGate`].
///
/// The operation counts as in flight until the permit is ended or dropped.
#[derive(Debug)]
#[must_use = "dropping a permit ends the operation immediately"]
pub struct Permit {
    _token: TaskTrackerToken,
}

impl Permit {
    /// Marks the operation as finished.
    pub fn end(self) {}
}

impl ShutdownGate {
    /// Creates an open gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks to begin an operation.
    ///
    /// Returns `None` when shutdown has already started.
    pub fn try_begin(&self) -> Option<Permit> {
        if self.is_shutting_down() {
            return None;
        }
        let token = self.inner.tracker.token();

        // Shutdown may have started between the check and the registration.
        if self.is_shutting_down() {
            drop(token);
            return None;
        }
        Some(Permit { _token: token })
    }

    /// Whether draining has started.
    pub fn is_shutting_down(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Number of admitted operations that have not ended yet.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Starts draining and waits up to `grace` for in-flight operations to end.
    ///
    /// Calling it again (or concurrently) is allowed; every caller waits on
    /// the same drain.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), GateError> {
        self.inner.draining.store(true, Ordering::SeqCst);
        self.inner.tracker.close();
        tracing::info!(in_flight = self.in_flight(), ?grace, "draining in-flight operations");

        match tokio::time::timeout(grace, self.inner.tracker.wait()).await {
            Ok(()) => {
                tracing::info!("all operations ended within grace");
                Ok(())
            }
            Err(_elapsed) => {
                let in_flight = self.in_flight();
                tracing::warn!(in_flight, ?grace, "shutdown grace exceeded");
                Err(GateError::GraceExceeded { grace, in_flight })
            }
        }
    }

    /// Waits for a termination signal, then drains as [`shutdown`](Self::shutdown) does.
    pub async fn shutdown_on_signal(&self, grace: Duration) -> Result<(), GateError> {
        let signal = wait_for_shutdown_signal().await?;
        tracing::debug!(signal, "starting drain");
        self.shutdown(grace).await
    }
}
