//! # Heartbeat scheduler: idle keepalive for one stream session.
//!
//! ## Cycle
//! ```text
//! loop {
//!   ├─► lock: closed? → stop
//!   │         next = max(last_send_at, last_failure) + interval
//!   ├─► unlock, wait for the first of:
//!   │     ├─ external token cancelled → stop
//!   │     ├─ done signal              → stop
//!   │     └─ sleep_until(next)
//!   └─► lock: closed / cancelled? → stop
//!             now >= last_send_at + interval ?
//!               ├─ yes → write ": ping\n\n" (errors logged, swallowed)
//!               └─ no  → a real frame went out meanwhile, recompute
//! }
//! ```
//!
//! ## Rules
//! - The deadline is derived from `last_send_at` on every cycle, never from a
//!   fixed-period ticker, so a heartbeat only follows true idleness.
//! - The idle test is repeated under the lock after waking: a frame written
//!   between the timer firing and the lock being re-acquired suppresses the ping.
//! - A failed ping is retried one full interval later, not immediately.
//! - An interval too large to add to the clock never fires; the task then only
//!   waits for its exit signals.
//! - The only exits are the external token, the done signal, and a closed session.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::frame;
use super::session::Shared;

/// Drives heartbeats for `shared` until the session closes or `token` is cancelled.
pub(crate) async fn run(shared: Arc<Shared>, interval: Duration, token: CancellationToken) {
    let mut failed_at: Option<Instant> = None;

    loop {
        let next = {
            let state = shared.state.lock().await;
            if state.is_closed() {
                return;
            }
            failed_at
                .map_or(state.last_send_at, |at| at.max(state.last_send_at))
                .checked_add(interval)
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = shared.done.cancelled() => return,
            _ = wait_until(next) => {}
        }

        let mut state = shared.state.lock().await;
        if state.is_closed() || shared.done.is_cancelled() || token.is_cancelled() {
            return;
        }
        let due = state
            .last_send_at
            .checked_add(interval)
            .is_some_and(|deadline| Instant::now() >= deadline);
        if !due {
            continue;
        }

        match state.send(&frame::ping()).await {
            Ok(()) => failed_at = None,
            Err(error) => {
                tracing::debug!(error = %error, label = error.as_label(), "heartbeat write failed");
                failed_at = Some(Instant::now());
            }
        }
    }
}

/// Sleeps until `deadline`; a deadline past the clock's range never arrives.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
