//! Panic payload formatting and panic-site capture for launched units.
//!
//! By the time `catch_unwind` returns, the faulting frames are gone. The
//! process panic hook still runs on top of them, so [`install_hook`] chains a
//! hook that records the location and a backtrace into a thread-local slot.
//! Only panics raised while a launched unit is being polled ([`armed`]) are
//! recorded; the boundary reads the slot with [`take_site`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::Once;

use futures::future::poll_fn;

/// Where a launched unit panicked.
pub(crate) struct PanicSite {
    pub(crate) location: String,
    pub(crate) backtrace: Backtrace,
}

thread_local! {
    static ARMED: Cell<usize> = const { Cell::new(0) };
    static LAST_SITE: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains the capturing hook in front of whatever hook is installed. Runs once per process.
pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if ARMED.with(Cell::get) > 0 {
                let site = PanicSite {
                    location: info
                        .location()
                        .map_or_else(|| "<unknown>".to_string(), ToString::to_string),
                    backtrace: Backtrace::force_capture(),
                };
                LAST_SITE.with(|slot| *slot.borrow_mut() = Some(site));
            }
            previous(info);
        }));
    });
}

/// Removes the site recorded by the last armed panic on this thread.
pub(crate) fn take_site() -> Option<PanicSite> {
    LAST_SITE.with(|slot| slot.borrow_mut().take())
}

struct ArmGuard;

impl ArmGuard {
    fn enter() -> Self {
        ARMED.with(|armed| armed.set(armed.get() + 1));
        ArmGuard
    }
}

impl Drop for ArmGuard {
    // Also runs while unwinding, after the hook has fired.
    fn drop(&mut self) {
        ARMED.with(|armed| armed.set(armed.get().saturating_sub(1)));
    }
}

/// Wraps `fut` so that panics raised while it is polled are recorded by the hook.
pub(crate) fn armed<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let mut fut = Box::pin(fut);
    poll_fn(move |cx| {
        let _guard = ArmGuard::enter();
        fut.as_mut().poll(cx)
    })
}

/// Extracts a readable message from a caught panic payload.
///
/// `panic!` with a literal yields `&'static str`, with a format string a `String`;
/// anything else (`std::panic::panic_any`) is reported as unknown.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
