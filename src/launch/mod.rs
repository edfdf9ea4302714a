//! # Panic-isolated background tasks.
//!
//! - [`Launcher`] - spawns units of work behind a panic boundary, logging through
//!   an explicit or default `tracing` dispatcher
//! - [`launch`] / [`launch_tracked`] - convenience calls using the default launcher

mod launcher;
mod panic;

pub use launcher::{Launcher, launch, launch_tracked};
