//! Process drain coordination.
//!
//! - [`ShutdownGate`] / [`Permit`]: admission of new work and bounded drain;
//! - [`signal`]: cross-platform termination signal handling.

mod drain;
pub mod signal;

pub use drain::{Permit, ShutdownGate};
