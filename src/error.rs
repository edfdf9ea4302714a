//! Error types used by stream sessions and the shutdown gate.
//!
//! This module defines two main error enums:
//!
//! - [`StreamError`]: errors raised by a [`StreamSession`](crate::StreamSession) write or construction.
//! - [`GateError`]: errors raised while draining a [`ShutdownGate`](crate::ShutdownGate).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// # Errors produced by a stream session.
///
/// Write failures are returned to the producer that triggered them and never
/// close the session on their own; the producer decides whether to call
/// [`StreamSession::done`](crate::StreamSession::done).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StreamError {
    /// The session was already closed by `done()`; nothing was written.
    #[error("stream session is closed")]
    Closed,

    /// The sink cannot push bytes to the client incrementally.
    #[error("sink does not support incremental flush")]
    Unflushable,

    /// The shutdown gate is draining and refused a new session.
    #[error("shutdown in progress; new sessions are refused")]
    ShuttingDown,

    /// An event name or comment text would break frame boundaries.
    #[error("{field} must not contain line breaks: {value:?}")]
    InvalidField {
        /// Which frame field was rejected (`event` or `comment`).
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// The event payload could not be encoded as JSON; nothing was written.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Transport-level write or flush failure.
    #[error("sink i/o failed: {0}")]
    Io(#[from] io::Error),
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ssevisor::StreamError;
    ///
    /// assert_eq!(StreamError::Closed.as_label(), "stream_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Closed => "stream_closed",
            StreamError::Unflushable => "stream_unflushable",
            StreamError::ShuttingDown => "stream_shutting_down",
            StreamError::InvalidField { .. } => "stream_invalid_field",
            StreamError::Encode(_) => "stream_encode",
            StreamError::Io(_) => "stream_io",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StreamError::Closed => "closed".to_string(),
            StreamError::Unflushable => "sink cannot flush".to_string(),
            StreamError::ShuttingDown => "shutting down".to_string(),
            StreamError::InvalidField { field, value } => format!("invalid {field}: {value:?}"),
            StreamError::Encode(e) => format!("encode: {e}"),
            StreamError::Io(e) => format!("io ({:?}): {e}", e.kind()),
        }
    }

    /// Indicates whether the error came from the transport.
    ///
    /// A transport failure usually means the client is gone, so the producer
    /// should stop emitting and close the session.
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Io(_))
    }
}

/// # Errors produced while draining the shutdown gate.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum GateError {
    /// The drain deadline elapsed while operations were still in flight.
    #[error("shutdown grace {grace:?} exceeded; {in_flight} operation(s) still in flight")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Operations that had not ended when the deadline elapsed.
        in_flight: usize,
    },

    /// OS signal listeners could not be registered.
    #[error("signal registration failed: {0}")]
    Signal(#[from] io::Error),
}

impl GateError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ssevisor::GateError;
    /// use std::time::Duration;
    ///
    /// let err = GateError::GraceExceeded { grace: Duration::from_secs(5), in_flight: 2 };
    /// assert_eq!(err.as_label(), "gate_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GateError::GraceExceeded { .. } => "gate_grace_exceeded",
            GateError::Signal(_) => "gate_signal",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            GateError::GraceExceeded { grace, in_flight } => {
                format!("grace exceeded after {grace:?}; in_flight={in_flight}")
            }
            GateError::Signal(e) => format!("signal: {e}"),
        }
    }
}
