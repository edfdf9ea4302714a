//! # Process-wide `tracing` subscriber setup.
//!
//! Components log through `tracing`; [`Launcher`](crate::Launcher) can be
//! handed an explicit [`Dispatch`](tracing::Dispatch) instead. This helper
//! installs the process default that every other call site falls back to.
//!
//! Enable with: `--features logging`

use tracing_subscriber::EnvFilter;

/// Installs a compact stderr subscriber as the global default.
///
/// `RUST_LOG` takes precedence; `level` is the fallback filter (e.g. `"info"`,
/// `"ssevisor=debug"`). Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
