//! Server-sent event framing.
//!
//! ```text
//! event: <name>\n        (omitted if name is empty)
//! data: <json payload>\n (omitted if payload absent)
//! \n                     (frame terminator, always present)
//!
//! : <text>\n\n           (comment / heartbeat)
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::StreamError;

/// `Content-Type` of an event-stream response body.
pub const CONTENT_TYPE: &str = "text/event-stream";

/// Name of the terminal event sent by `done()`.
pub const DONE_EVENT: &str = "done";

/// Text of the heartbeat comment.
pub const PING: &str = "ping";

/// Encodes one event frame.
///
/// The payload is serialized before anything is produced, so an encoding
/// failure leaves nothing half-written.
pub(crate) fn event<T>(name: &str, data: Option<&T>) -> Result<Bytes, StreamError>
where
    T: Serialize + ?Sized,
{
    ensure_single_line("event", name)?;
    let payload = data.map(serde_json::to_vec).transpose()?;

    let payload_len = payload.as_ref().map_or(0, Vec::len);
    let mut buf = BytesMut::with_capacity(name.len() + payload_len + 16);
    if !name.is_empty() {
        buf.put_slice(b"event: ");
        buf.put_slice(name.as_bytes());
        buf.put_u8(b'\n');
    }
    if let Some(payload) = payload {
        buf.put_slice(b"data: ");
        buf.put_slice(&payload);
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// The terminal frame sent by `done()`.
pub(crate) fn done() -> Bytes {
    Bytes::from_static(b"event: done\n\n")
}

/// The heartbeat comment frame.
pub(crate) fn ping() -> Bytes {
    Bytes::from_static(b": ping\n\n")
}

/// Encodes one comment frame.
pub(crate) fn comment(text: &str) -> Result<Bytes, StreamError> {
    ensure_single_line("comment", text)?;

    let mut buf = BytesMut::with_capacity(text.len() + 4);
    buf.put_slice(b": ");
    buf.put_slice(text.as_bytes());
    buf.put_slice(b"\n\n");
    Ok(buf.freeze())
}

fn ensure_single_line(field: &'static str, value: &str) -> Result<(), StreamError> {
    if value.contains(['\n', '\r']) {
        return Err(StreamError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
