//! # StreamSession: one long-lived server-sent event response.
//!
//! A session owns the output [`Sink`], the instant of the last successful
//! write and the closed state, all behind a single async mutex. Producers and
//! the heartbeat scheduler both write through it, so frames are totally
//! ordered and never interleave.
//!
//! ## Lifecycle
//! ```text
//! builder(sink, token) ──► build()
//!     ├─ sink can't flush        → Err(Unflushable)   (nothing launched)
//!     ├─ gate is draining        → Err(ShuttingDown)
//!     └─ heartbeat > 0           → launch heartbeat::run(shared, interval, token)
//!
//! event()/comment()/heartbeat() ──► lock ──► closed? → Err(Closed)
//!                                         └─► write frame, flush, last_send_at = now
//!
//! done() ──► lock ──► closed? → Err(Closed)
//!                 └─► write "event: done\n\n" (best-effort)
//!                     drop sink + gate permit, fire done signal
//!                     return the write result
//! ```
//!
//! ## Rules
//! - **Total order**: at most one write is in flight on the sink.
//! - **Closed is terminal**: once `done()` ran, no byte reaches the sink again.
//! - **No auto-close**: write failures are returned to the caller; the session
//!   stays open until `done()` or drop.
//! - Dropping the last handle closes the session without a terminal frame.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::frame::{self, PING};
use super::heartbeat;
use super::sink::Sink;
use crate::config::SessionConfig;
use crate::error::StreamError;
use crate::gate::{Permit, ShutdownGate};
use crate::launch::Launcher;

/// Everything guarded by the session's write lock.
pub(crate) struct State {
    /// `None` once the session is closed.
    sink: Option<Box<dyn Sink>>,
    pub(crate) last_send_at: Instant,
    permit: Option<Permit>,
}

impl State {
    pub(crate) fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    /// Writes and flushes one frame; the clock only moves on success.
    pub(crate) async fn send(&mut self, frame: &[u8]) -> Result<(), StreamError> {
        let sink = self.sink.as_mut().ok_or(StreamError::Closed)?;
        sink.write(frame).await?;
        sink.flush().await?;
        self.last_send_at = Instant::now();
        Ok(())
    }

    fn close(&mut self) {
        self.sink = None;
        self.permit = None;
    }
}

/// State shared between a session handle and its heartbeat task.
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    /// One-shot done signal, fired together with the transition to closed.
    pub(crate) done: CancellationToken,
}

/// A live server-sent event stream.
///
/// Methods take `&self`; wrap the session in an `Arc` to emit from several
/// producers.
///
/// ## Example
/// ```rust
/// use serde_json::json;
/// use ssevisor::{ChannelSink, SessionConfig, StreamSession};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), ssevisor::StreamError> {
/// let (sink, _body) = ChannelSink::new(16);
/// let session = StreamSession::open(sink, CancellationToken::new(), &SessionConfig::default())?;
///
/// session.event("update", Some(&json!({"x": 1}))).await?;
/// session.done().await?;
/// assert!(session.is_closed());
/// # Ok(())
/// # }
/// ```
pub struct StreamSession {
    shared: Arc<Shared>,
    heartbeat: Option<Duration>,
}

impl StreamSession {
    /// Opens a session with `config`, using the default [`Launcher`] and no gate.
    pub fn open(
        sink: impl Sink,
        token: CancellationToken,
        config: &SessionConfig,
    ) -> Result<Self, StreamError> {
        Self::builder(sink, token).config(config.clone()).build()
    }

    /// Starts building a session over `sink`.
    ///
    /// `token` is the external cancellation source (client disconnect, parent
    /// deadline); cancelling it stops heartbeats.
    pub fn builder(sink: impl Sink, token: CancellationToken) -> SessionBuilder {
        SessionBuilder::new(Box::new(sink), token)
    }

    /// Emits one event frame.
    ///
    /// The `event:` line is omitted when `name` is empty, the `data:` line when
    /// `data` is `None`. The payload is encoded as compact single-line JSON.
    pub async fn event<T>(&self, name: &str, data: Option<&T>) -> Result<(), StreamError>
    where
        T: Serialize + ?Sized,
    {
        let mut state = self.shared.state.lock().await;
        if state.is_closed() {
            return Err(StreamError::Closed);
        }
        let frame = frame::event(name, data)?;
        state.send(&frame).await
    }

    /// Emits one comment frame (`: <text>`), ignored by clients.
    pub async fn comment(&self, text: &str) -> Result<(), StreamError> {
        let mut state = self.shared.state.lock().await;
        if state.is_closed() {
            return Err(StreamError::Closed);
        }
        let frame = frame::comment(text)?;
        state.send(&frame).await
    }

    /// Emits a `: ping` keepalive comment.
    pub async fn heartbeat(&self) -> Result<(), StreamError> {
        self.comment(PING).await
    }

    /// Sends the terminal `done` event and closes the session.
    ///
    /// The session closes even if the final write fails; that failure is
    /// returned. Only the first call does anything; later calls get
    /// [`StreamError::Closed`].
    pub async fn done(&self) -> Result<(), StreamError> {
        let mut state = self.shared.state.lock().await;
        if state.is_closed() {
            return Err(StreamError::Closed);
        }
        let res = state.send(&frame::done()).await;

        state.close();
        self.shared.done.cancel();
        tracing::debug!(clean = res.is_ok(), "stream session closed");
        res
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.done.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.shared.done.cancelled().await;
    }

    /// Configured heartbeat interval (`None` = heartbeats disabled).
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // The heartbeat task may hold the lock right now; it re-checks the done signal.
        if let Ok(mut state) = self.shared.state.try_lock() {
            state.close();
        }
        self.shared.done.cancel();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("heartbeat", &self.heartbeat)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder for [`StreamSession`].
pub struct SessionBuilder {
    sink: Box<dyn Sink>,
    token: CancellationToken,
    config: SessionConfig,
    launcher: Launcher,
    gate: Option<ShutdownGate>,
}

impl SessionBuilder {
    fn new(sink: Box<dyn Sink>, token: CancellationToken) -> Self {
        Self {
            sink,
            token,
            config: SessionConfig::default(),
            launcher: Launcher::default(),
            gate: None,
        }
    }

    /// Replaces the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the idle heartbeat interval (`Duration::ZERO` disables heartbeats).
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.config.heartbeat = interval;
        self
    }

    /// Launches the heartbeat task through `launcher` (and logs through its dispatcher).
    pub fn launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Admits the session through `gate`; the permit is held until the session closes.
    pub fn gate(mut self, gate: &ShutdownGate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Opens the session.
    ///
    /// Fails before launching anything if the sink cannot flush incrementally
    /// or the gate is draining. With heartbeats enabled this must run inside a
    /// tokio runtime.
    pub fn build(self) -> Result<StreamSession, StreamError> {
        if !self.sink.supports_flush() {
            return Err(StreamError::Unflushable);
        }
        let permit = match &self.gate {
            Some(gate) => Some(gate.try_begin().ok_or(StreamError::ShuttingDown)?),
            None => None,
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                sink: Some(self.sink),
                last_send_at: Instant::now(),
                permit,
            }),
            done: CancellationToken::new(),
        });

        let heartbeat = self.config.heartbeat_interval();
        if let Some(interval) = heartbeat {
            let shared = Arc::clone(&shared);
            self.launcher.launch("sse-heartbeat", self.token, move |token| {
                heartbeat::run(shared, interval, token)
            });
        }

        Ok(StreamSession { shared, heartbeat })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;

    const PING_FRAME: &[u8] = b": ping\n\n";

    /// Sink recording each flushed chunk with the (tokio) time it left.
    #[derive(Clone, Default)]
    struct Recorder {
        chunks: Arc<StdMutex<Vec<(Instant, Bytes)>>>,
        pending: Arc<StdMutex<Vec<u8>>>,
        fail: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
        unflushable: bool,
    }

    impl Recorder {
        fn chunks(&self) -> Vec<Bytes> {
            self.chunks.lock().unwrap().iter().map(|(_, b)| b.clone()).collect()
        }

        fn times_of(&self, frame: &[u8]) -> Vec<Instant> {
            self.chunks
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, b)| &b[..] == frame)
                .map(|(t, _)| *t)
                .collect()
        }

        fn bytes(&self) -> Vec<u8> {
            self.chunks().concat()
        }
    }

    struct RecorderSink(Recorder);

    impl Drop for RecorderSink {
        fn drop(&mut self) {
            self.0.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Sink for RecorderSink {
        async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.0.attempts.fetch_add(1, Ordering::SeqCst);
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "client gone"));
            }
            self.0.pending.lock().unwrap().extend_from_slice(buf);
            Ok(())
        }

        async fn flush(&mut self) -> io::Result<()> {
            let chunk = std::mem::take(&mut *self.0.pending.lock().unwrap());
            self.0
                .chunks
                .lock()
                .unwrap()
                .push((Instant::now(), Bytes::from(chunk)));
            Ok(())
        }

        fn supports_flush(&self) -> bool {
            !self.0.unflushable
        }
    }

    fn open(rec: &Recorder, heartbeat: Duration, token: &CancellationToken) -> StreamSession {
        StreamSession::builder(RecorderSink(rec.clone()), token.clone())
            .heartbeat(heartbeat)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn event_then_done_then_closed() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::ZERO, &CancellationToken::new());

        session.event("update", Some(&json!({"x": 1}))).await.unwrap();
        assert_eq!(rec.bytes(), b"event: update\ndata: {\"x\":1}\n\n");

        session.done().await.unwrap();
        assert_eq!(rec.bytes(), b"event: update\ndata: {\"x\":1}\n\nevent: done\n\n");

        let err = session.event::<()>("x", None).await.unwrap_err();
        assert!(matches!(err, StreamError::Closed));
        assert_eq!(rec.bytes(), b"event: update\ndata: {\"x\":1}\n\nevent: done\n\n");
    }

    #[tokio::test]
    async fn writes_after_done_never_touch_the_sink() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::ZERO, &CancellationToken::new());
        session.done().await.unwrap();
        let attempts = rec.attempts.load(Ordering::SeqCst);
        assert!(rec.dropped.load(Ordering::SeqCst), "closing releases the sink");

        assert!(matches!(session.comment("late").await, Err(StreamError::Closed)));
        assert!(matches!(session.heartbeat().await, Err(StreamError::Closed)));
        assert!(matches!(
            session.event("late", Some(&1)).await,
            Err(StreamError::Closed)
        ));
        assert!(matches!(session.done().await, Err(StreamError::Closed)));
        assert_eq!(rec.attempts.load(Ordering::SeqCst), attempts);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_done_closes_exactly_once() {
        let rec = Recorder::default();
        let session = Arc::new(open(&rec, Duration::ZERO, &CancellationToken::new()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move { session.done().await }));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(()) => ok += 1,
                Err(StreamError::Closed) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(rec.times_of(b"event: done\n\n").len(), 1);
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_gets_heartbeats() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(220)).await;

        let chunks = rec.chunks();
        let pings = chunks.iter().filter(|c| &c[..] == PING_FRAME).count();
        assert!((3..=5).contains(&pings), "pings: {pings}");
        assert_eq!(pings, chunks.len(), "only heartbeats were written");
        assert!(!session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_are_spaced_by_the_interval() {
        let rec = Recorder::default();
        let start = Instant::now();
        let _session = open(&rec, Duration::from_millis(50), &CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(520)).await;

        let times = rec.times_of(PING_FRAME);
        assert!(times.len() >= 10, "pings: {}", times.len());
        assert!(times[0] - start >= Duration::from_millis(50));
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(50), "gap {gap:?} shorter than interval");
            assert!(gap <= Duration::from_millis(60), "gap {gap:?} too long");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn event_resets_the_heartbeat_clock() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(30)).await;
        session.event("tick", Some(&1)).await.unwrap();
        let event_at = Instant::now();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rec.times_of(PING_FRAME).is_empty(), "no ping within the interval");

        tokio::time::sleep(Duration::from_millis(40)).await;
        let pings = rec.times_of(PING_FRAME);
        assert_eq!(pings.len(), 1);
        assert!(pings[0] - event_at >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_producer_suppresses_heartbeats() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());

        for i in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.event("n", Some(&i)).await.unwrap();
        }
        assert!(rec.times_of(PING_FRAME).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_heartbeats_but_not_the_session() {
        let rec = Recorder::default();
        let token = CancellationToken::new();
        let session = open(&rec, Duration::from_millis(50), &token);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(rec.times_of(PING_FRAME).len(), 2);

        token.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(rec.times_of(PING_FRAME).len(), 2);

        assert!(!session.is_closed());
        session.event("still", Some(&true)).await.unwrap();
        assert_eq!(Arc::strong_count(&session.shared), 1, "heartbeat task exited");
    }

    #[tokio::test(start_paused = true)]
    async fn done_stops_the_heartbeat_task() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());
        assert_eq!(Arc::strong_count(&session.shared), 2);

        session.done().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(Arc::strong_count(&session.shared), 1);
        assert!(rec.times_of(PING_FRAME).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_session_stops_heartbeats_and_releases_the_sink() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(session);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rec.times_of(PING_FRAME).len(), 1);
        assert!(rec.dropped.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_heartbeat_deadline_keeps_the_task_alive() {
        for interval in [Duration::MAX, Duration::from_secs(u64::MAX)] {
            let rec = Recorder::default();
            let session = open(&rec, interval, &CancellationToken::new());

            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(Arc::strong_count(&session.shared), 2, "heartbeat task still running");

            session.event("tick", Some(&1)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(Arc::strong_count(&session.shared), 2);
            assert!(rec.times_of(PING_FRAME).is_empty());

            session.done().await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(Arc::strong_count(&session.shared), 1, "done still stops it");
        }
    }

    #[tokio::test]
    async fn unflushable_sink_is_rejected() {
        let rec = Recorder {
            unflushable: true,
            ..Recorder::default()
        };
        let err = StreamSession::builder(RecorderSink(rec.clone()), CancellationToken::new())
            .heartbeat(Duration::from_millis(1))
            .build()
            .unwrap_err();

        assert!(matches!(err, StreamError::Unflushable));
        assert!(rec.dropped.load(Ordering::SeqCst), "no task kept the sink");
    }

    #[tokio::test]
    async fn write_failure_is_returned_and_session_stays_open() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::ZERO, &CancellationToken::new());

        rec.fail.store(true, Ordering::SeqCst);
        let err = session.event("x", Some(&1)).await.unwrap_err();
        assert!(err.is_transport());
        assert!(!session.is_closed());

        rec.fail.store(false, Ordering::SeqCst);
        session.comment("recovered").await.unwrap();
        assert_eq!(rec.bytes(), b": recovered\n\n");
    }

    #[tokio::test]
    async fn done_closes_even_when_final_write_fails() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::ZERO, &CancellationToken::new());

        rec.fail.store(true, Ordering::SeqCst);
        assert!(matches!(session.done().await, Err(StreamError::Io(_))));
        assert!(session.is_closed());
        assert!(matches!(session.comment("x").await, Err(StreamError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_heartbeat_is_swallowed_and_does_not_spin() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::from_millis(50), &CancellationToken::new());
        rec.fail.store(true, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(220)).await;
        let attempts = rec.attempts.load(Ordering::SeqCst);
        assert!((3..=5).contains(&attempts), "attempts: {attempts}");
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn invalid_fields_write_nothing() {
        let rec = Recorder::default();
        let session = open(&rec, Duration::ZERO, &CancellationToken::new());

        assert!(matches!(
            session.event::<()>("a\nb", None).await,
            Err(StreamError::InvalidField { field: "event", .. })
        ));
        assert!(matches!(
            session.comment("a\rb").await,
            Err(StreamError::InvalidField { field: "comment", .. })
        ));
        assert_eq!(rec.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gate_admission_and_release() {
        let gate = ShutdownGate::new();
        let rec = Recorder::default();
        let session = StreamSession::builder(RecorderSink(rec.clone()), CancellationToken::new())
            .heartbeat(Duration::ZERO)
            .gate(&gate)
            .build()
            .unwrap();
        assert_eq!(gate.in_flight(), 1);

        session.done().await.unwrap();
        assert_eq!(gate.in_flight(), 0);

        gate.shutdown(Duration::from_millis(10)).await.unwrap();
        let err = StreamSession::builder(RecorderSink(rec), CancellationToken::new())
            .gate(&gate)
            .build()
            .unwrap_err();
        assert!(matches!(err, StreamError::ShuttingDown));
    }

    #[tokio::test]
    async fn closed_resolves_after_done() {
        let rec = Recorder::default();
        let session = Arc::new(open(&rec, Duration::ZERO, &CancellationToken::new()));
        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.closed().await })
        };

        session.done().await.unwrap();
        waiter.await.unwrap();
        assert_eq!(session.heartbeat_interval(), None);
    }
}
