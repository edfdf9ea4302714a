//! # Output sinks for stream sessions.
//!
//! A [`Sink`] is the open response body a [`StreamSession`](crate::StreamSession)
//! writes frames into. The session owns it exclusively and serializes every
//! call, so implementations need no internal locking.
//!
//! Provided implementations:
//! - [`IoSink`] wraps any [`AsyncWrite`] (TCP stream, pipe, hyper upgrade, ...).
//! - [`ChannelSink`] hands each flushed frame to a bounded channel whose
//!   receiving end ([`ReceiverStream<Bytes>`]) can be used as a streaming HTTP body.
//!
//! ## Rules
//! - `write` may buffer; bytes are only guaranteed to leave after `flush`.
//! - A sink that cannot deliver bytes before the whole response completes
//!   (e.g. a fully buffered body) must report `supports_flush() == false`;
//!   sessions refuse such sinks at construction.

use std::io;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::launch::Launcher;

/// Destination of event-stream frames.
#[async_trait]
pub trait Sink: Send + 'static {
    /// Writes `buf` entirely, or fails.
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Pushes buffered bytes to the client.
    async fn flush(&mut self) -> io::Result<()>;

    /// Whether [`flush`](Self::flush) delivers bytes incrementally.
    ///
    /// Default: `true`.
    fn supports_flush(&self) -> bool {
        true
    }
}

/// [`Sink`] over any tokio [`AsyncWrite`].
#[derive(Debug)]
pub struct IoSink<W> {
    inner: W,
}

impl<W> IoSink<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> Sink for IoSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }
}

/// [`Sink`] that forwards each flushed frame into a bounded channel.
///
/// ```text
/// session.event() ──► write (buffer) ──► flush ──► mpsc ──► ReceiverStream<Bytes> ──► HTTP body
/// ```
///
/// When the receiving side is dropped (client disconnected, body discarded),
/// `flush` fails with [`io::ErrorKind::BrokenPipe`].
#[derive(Debug)]
pub struct ChannelSink {
    buf: BytesMut,
    tx: mpsc::Sender<Bytes>,
    // Cancelled on drop so a disconnect watcher releases its sender and the body can end.
    dropped: CancellationToken,
}

impl ChannelSink {
    /// Creates a sink and the body stream it feeds.
    ///
    /// `capacity` is the number of frames that may be queued before `flush`
    /// waits for the consumer (clamped to 1).
    pub fn new(capacity: usize) -> (Self, ReceiverStream<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Self {
            buf: BytesMut::new(),
            tx,
            dropped: CancellationToken::new(),
        };
        (sink, ReceiverStream::new(rx))
    }

    /// Creates a sink sized by [`SessionConfig::channel_capacity`].
    pub fn from_config(config: &SessionConfig) -> (Self, ReceiverStream<Bytes>) {
        Self::new(config.channel_capacity_clamped())
    }

    /// Returns a child of `parent` that is cancelled once the receiving side goes away.
    ///
    /// Pass the returned token to the session as its cancellation source so
    /// heartbeats stop as soon as the client disconnects. The watcher task is
    /// started through `launcher` and exits when the receiver goes away, the
    /// token is cancelled, or this sink is dropped.
    pub fn disconnect_token(
        &self,
        parent: &CancellationToken,
        launcher: &Launcher,
    ) -> CancellationToken {
        let token = parent.child_token();
        let tx = self.tx.clone();
        let dropped = self.dropped.clone();
        launcher.launch("sse-disconnect-watch", token.clone(), move |token| async move {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("event-stream receiver dropped");
                    token.cancel();
                }
                _ = token.cancelled() => {}
                _ = dropped.cancelled() => {}
            }
        });
        token
    }

    /// Whether the receiving side has been dropped.
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Drop for ChannelSink {
    fn drop(&mut self) {
        self.dropped.cancel();
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx
            .send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event-stream receiver dropped"))
    }
}
