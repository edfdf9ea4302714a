//! # Server-sent event streams.
//!
//! - [`StreamSession`] / [`SessionBuilder`]: serialized writes, terminal close, idle heartbeats;
//! - [`Sink`], [`IoSink`], [`ChannelSink`]: where frames go;
//! - wire constants [`CONTENT_TYPE`], [`DONE_EVENT`], [`PING`].
//!
//! The heartbeat scheduler is internal: one task per session, started when
//! the configured interval is positive.

mod frame;
mod heartbeat;
mod session;
mod sink;

pub use frame::{CONTENT_TYPE, DONE_EVENT, PING};
pub use session::{SessionBuilder, StreamSession};
pub use sink::{ChannelSink, IoSink, Sink};
