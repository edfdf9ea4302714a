//! # ssevisor
//!
//! **ssevisor** keeps server-sent event (SSE) responses alive and tears them
//! down cleanly.
//!
//! It provides a [`StreamSession`] that serializes every frame written to an
//! open HTTP response body, sends `: ping` heartbeats only while the client
//! is idle, and closes exactly once no matter whether the producer, the
//! heartbeat timer, or the consumer's cancellation gets there first. Background
//! work runs through a panic-isolated [`Launcher`], and a [`ShutdownGate`]
//! refuses new sessions while the process drains.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   producer(s)                               external token
//!  (request handler)                    (client disconnect / deadline)
//!        │                                           │
//!        │ event() / comment() / done()              │
//!        ▼                                           ▼
//! ┌──────────────────────────────────┐   ┌──────────────────────────┐
//! │ StreamSession                    │   │ heartbeat task           │
//! │  Mutex<State>                    │◄──│  (launched via Launcher) │
//! │   - sink (None once closed)      │   │  sleep_until(last+I)     │
//! │   - last_send_at                 │   │  idle? → ": ping\n\n"    │
//! │   - gate permit                  │   └──────────────────────────┘
//! │  done: CancellationToken ────────┼──────────► stops heartbeat
//! └───────────────┬──────────────────┘
//!                 ▼
//!           Sink (IoSink / ChannelSink) ──► HTTP response body
//! ```
//!
//! ### Wire format
//! ```text
//! event: <name>\n        (omitted if name is empty)
//! data: <json>\n         (omitted if no payload)
//! \n
//!
//! : ping\n\n             (heartbeat)
//! event: done\n\n        (terminal frame)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types                                 |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------|
//! | **Sessions**      | Serialized frames, idle heartbeats, one-shot close.           | [`StreamSession`], [`SessionBuilder`]     |
//! | **Sinks**         | Response bodies that flush incrementally.                     | [`Sink`], [`IoSink`], [`ChannelSink`]     |
//! | **Launching**     | Fire-and-forget tasks whose panics are logged, not propagated.| [`Launcher`], [`launch`]                  |
//! | **Drain**         | Admission control and bounded wait during shutdown.           | [`ShutdownGate`], [`Permit`]              |
//! | **Errors**        | Typed errors with stable labels.                              | [`StreamError`], [`GateError`]            |
//! | **Configuration** | Heartbeat interval and channel sizing.                        | [`SessionConfig`]                         |
//!
//! ## Optional features
//! - `logging`: exports [`logging::init_subscriber`] to install a `tracing` subscriber.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//! use ssevisor::{ChannelSink, Launcher, ShutdownGate, StreamSession};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gate = ShutdownGate::new();
//!     let launcher = Launcher::new();
//!
//!     // `body` is what an HTTP framework streams back to the client.
//!     let (sink, body) = ChannelSink::new(16);
//!     let token = sink.disconnect_token(&CancellationToken::new(), &launcher);
//!
//!     let session = StreamSession::builder(sink, token)
//!         .heartbeat(Duration::from_secs(15))
//!         .launcher(launcher)
//!         .gate(&gate)
//!         .build()?;
//!
//!     session.event("progress", Some(&json!({"pct": 50}))).await?;
//!     session.done().await?;
//!
//!     gate.shutdown(Duration::from_secs(5)).await?;
//!     drop(body);
//!     Ok(())
//! }
//! ```
mod config;
mod error;
mod gate;
mod launch;
mod stream;

// ---- Public re-exports ----

pub use config::SessionConfig;
pub use error::{GateError, StreamError};
pub use gate::{Permit, ShutdownGate, signal};
pub use launch::{Launcher, launch, launch_tracked};
pub use stream::{
    CONTENT_TYPE, ChannelSink, DONE_EVENT, IoSink, PING, SessionBuilder, Sink, StreamSession,
};

// Optional: process-wide tracing subscriber setup.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub mod logging;
