//! # Termination signals that trigger a drain.
//!
//! [`wait_for_shutdown_signal`] resolves with the name of the first
//! termination signal the process receives. [`ShutdownGate::shutdown_on_signal`](crate::ShutdownGate::shutdown_on_signal)
//! uses it to start draining open streams.
//!
//! | Platform | Signals                         |
//! |----------|---------------------------------|
//! | Unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`  |
//! | Other    | Ctrl-C                          |

use std::io;

/// Waits for a termination signal and returns its name.
///
/// Listeners are registered per call. Fails if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv()      => "SIGQUIT",
    };
    tracing::info!(signal = name, "termination signal received");
    Ok(name)
}

/// Waits for Ctrl-C and returns its name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "termination signal received");
    Ok("ctrl-c")
}
