//! # Stream session configuration.
//!
//! Provides [`SessionConfig`], the settings applied when a
//! [`StreamSession`](crate::StreamSession) is opened.
//!
//! ## Sentinel values
//! - `heartbeat = 0s` → heartbeats disabled (no scheduler task is launched)
//! - `channel_capacity = 0` → clamped to 1 by [`ChannelSink`](crate::ChannelSink)

use std::time::Duration;

/// Configuration for a single stream session.
///
/// ## Field semantics
/// - `heartbeat`: idle interval after which a `: ping` comment is sent (`0s` = disabled)
/// - `channel_capacity`: frames buffered between a [`ChannelSink`](crate::ChannelSink)
///   and the HTTP body it feeds (min 1)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Idle interval before a heartbeat comment is emitted.
    ///
    /// The clock restarts on every successful write, so a busy stream never
    /// sees heartbeats.
    pub heartbeat: Duration,

    /// Capacity of the frame channel used by [`ChannelSink`](crate::ChannelSink).
    pub channel_capacity: usize,
}

impl SessionConfig {
    /// Returns the heartbeat interval as an `Option`.
    ///
    /// - `None` → heartbeats disabled
    /// - `Some(d)` → heartbeat after `d` of idleness
    #[inline]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat == Duration::ZERO {
            None
        } else {
            Some(self.heartbeat)
        }
    }

    /// Returns a channel capacity clamped to a minimum of 1.
    #[inline]
    pub fn channel_capacity_clamped(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Returns a copy with heartbeats disabled.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = Duration::ZERO;
        self
    }
}

impl Default for SessionConfig {
    /// Default configuration:
    ///
    /// - `heartbeat = 15s` (below common proxy idle timeouts)
    /// - `channel_capacity = 64`
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(15),
            channel_capacity: 64,
        }
    }
}
