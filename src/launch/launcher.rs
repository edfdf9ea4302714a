//! # Panic-isolated task launcher.
//!
//! [`Launcher`] runs a unit of work as an independent tokio task. A panic
//! raised inside the unit is caught at the task boundary, logged together with
//! a backtrace, and goes no further: the caller never observes it and the
//! process keeps running.
//!
//! ## Architecture
//! ```text
//! launch(name, token, f)
//!     │
//!     └──► tokio::spawn ──► catch_unwind(f(token)) ──► Ok  → task ends
//!                                  │
//!                                  └──► panic → error!(task, panic, location, backtrace) → task ends
//!
//! launch_tracked(tracker, ...)  same, but the task is registered with a TaskTracker
//!                               so the caller can `close()` + `wait()` for a drain
//! ```
//!
//! ## Rules
//! - **Fire-and-forget**: returns immediately; no result or error reaches the caller.
//! - **No supervision**: a panicked unit is not restarted or retried.
//! - **Completion is always signalled**: a tracked task counts as finished even
//!   when it panicked.
//! - Must be called from within a tokio runtime.
//!
//! The location and backtrace are recorded by a process panic hook, installed
//! on first launch and chained to the hook already in place, so they point at
//! the faulting frame rather than at the task boundary.
//!
//! **Warning**: `AssertUnwindSafe` is used, so state shared with the unit
//! (e.g. behind a `std::sync::Mutex`) can be left poisoned or inconsistent.
//! Builds with `panic = "abort"` cannot intercept anything.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Dispatch;
use tracing::instrument::WithSubscriber;

use super::panic;

/// Spawns units of work with panic isolation.
///
/// The launcher carries its logging collaborator: an explicit
/// [`Dispatch`] set through [`Launcher::with_dispatch`], or, by default, the
/// dispatcher that is current at launch time (the process-wide subscriber
/// unless a scoped one is active).
///
/// Cloning is cheap.
#[derive(Clone, Debug, Default)]
pub struct Launcher {
    dispatch: Option<Dispatch>,
}

impl Launcher {
    /// Creates a launcher that logs through the current default dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a launcher that logs through `dispatch`.
    pub fn with_dispatch(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Starts `f(token)` as an independent task and returns immediately.
    ///
    /// `name` only labels the diagnostic emitted if the unit panics.
    pub fn launch<F, Fut>(
        &self,
        name: impl Into<Cow<'static, str>>,
        token: CancellationToken,
        f: F,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _ = tokio::spawn(self.guarded(name.into(), token, f));
    }

    /// Same as [`launch`](Self::launch), but registers the task with `tracker`.
    ///
    /// After `tracker.close()`, `tracker.wait()` resolves once every unit
    /// launched through it has finished, panicked or not.
    pub fn launch_tracked<F, Fut>(
        &self,
        tracker: &TaskTracker,
        name: impl Into<Cow<'static, str>>,
        token: CancellationToken,
        f: F,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _ = tracker.spawn(self.guarded(name.into(), token, f));
    }

    /// Wraps the unit in the panic boundary and binds it to the logging collaborator.
    fn guarded<F, Fut>(
        &self,
        name: Cow<'static, str>,
        token: CancellationToken,
        f: F,
    ) -> impl Future<Output = ()> + Send + 'static
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let dispatch = self
            .dispatch
            .clone()
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        panic::install_hook();

        async move {
            // Calling `f` inside the boundary also covers panics raised while building the future.
            let unit = panic::armed(async move { f(token).await });

            if let Err(payload) = AssertUnwindSafe(unit).catch_unwind().await {
                // Another hook may have replaced ours; fall back to the boundary's stack.
                let (location, backtrace) = match panic::take_site() {
                    Some(site) => (site.location, site.backtrace),
                    None => ("<unknown>".to_string(), Backtrace::force_capture()),
                };
                tracing::error!(
                    task = %name,
                    panic = %panic::panic_message(payload.as_ref()),
                    %location,
                    %backtrace,
                    "launched task panicked"
                );
            }
        }
        .with_subscriber(dispatch)
    }
}

/// Starts `f(token)` with the default [`Launcher`].
pub fn launch<F, Fut>(name: impl Into<Cow<'static, str>>, token: CancellationToken, f: F)
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Launcher::new().launch(name, token, f);
}

/// Starts `f(token)` with the default [`Launcher`], tracked by `tracker`.
pub fn launch_tracked<F, Fut>(
    tracker: &TaskTracker,
    name: impl Into<Cow<'static, str>>,
    token: CancellationToken,
    f: F,
) where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Launcher::new().launch_tracked(tracker, name, token, f);
}
