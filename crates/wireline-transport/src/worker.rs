//! Shared connection machinery: the I/O worker and the per-transport state
//! core used by both the TCP and TLS flavors.
//!
//! The worker is a tokio task spawned only after a connection reaches
//! Connected. It owns the read half of the stream and is the single source
//! of listener callbacks, which is what makes the exactly-once failure
//! contract hold: connect-phase failures happen before the worker exists,
//! so they can only ever surface through the synchronous `connect()` result.

use std::future::Future;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::listener::TransportListener;
use crate::transport::{StateCell, TransportState};

/// Read chunk capacity when the options do not specify a receive buffer.
const DEFAULT_READ_CHUNK: usize = 64 * 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A live connection: write half plus the worker task that owns the read
/// half.
pub(crate) struct ActiveConnection {
    writer: Mutex<BoxedWriter>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveConnection {
    /// Split `stream` and spawn the read worker.
    ///
    /// Must only be called for a stream that has fully completed its
    /// connect (and handshake) sequence.
    pub(crate) fn spawn<S>(
        stream: S,
        listener: Arc<dyn TransportListener>,
        state: Arc<StateCell>,
        read_chunk: Option<usize>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            read_half,
            listener,
            state,
            cancel.clone(),
            read_chunk.unwrap_or(DEFAULT_READ_CHUNK),
        ));

        Self {
            writer: Mutex::new(Box::new(write_half) as BoxedWriter),
            cancel,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Write and flush `data` to the peer.
    pub(crate) async fn send(&self, data: Bytes) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Tear the connection down: stop the worker, wait for it, and shut the
    /// write half. Once this returns no further listener callbacks happen.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.reader.lock().await.take() {
            // A worker that died to a listener panic reports JoinError;
            // the teardown itself is unaffected.
            if let Err(err) = handle.await {
                debug!(?err, "read worker did not exit cleanly");
            }
        }
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            debug!(%err, "write half shutdown failed");
        }
    }
}

/// The read side of the I/O worker.
///
/// Terminal callback discipline: the loop exits immediately after the first
/// terminal delivery, and a local cancel exits without any callback at all,
/// so the listener sees at most one of `on_transport_closed` /
/// `on_transport_error` per transport. The state cell moves out of
/// Connected *before* the terminal delivery, so `is_connected()` is already
/// false by the time the callback runs. A local `close()` wins the state
/// race either way: the transitions here only fire from Connected.
async fn read_loop<R>(
    mut reader: ReadHalf<R>,
    listener: Arc<dyn TransportListener>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    chunk: usize,
) where
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(chunk);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("read worker cancelled by local close");
                return;
            }
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    debug!("peer closed the connection");
                    state.transition(TransportState::Connected, TransportState::Closed);
                    deliver(&listener, |l| l.on_transport_closed());
                    return;
                }
                Ok(_) => {
                    let data = buf.split().freeze();
                    if !deliver(&listener, |l| l.on_data(data)) {
                        // Listener is broken; stop delivering but leave the
                        // transport state to close() as usual.
                        return;
                    }
                    buf.reserve(chunk);
                }
                Err(err) => {
                    state.transition(TransportState::Connected, TransportState::Failed);
                    deliver(&listener, |l| l.on_transport_error(TransportError::Io(err)));
                    return;
                }
            }
        }
    }
}

/// Invoke a listener callback, containing any panic it raises.
///
/// Returns false when the callback panicked.
fn deliver<F>(listener: &Arc<dyn TransportListener>, call: F) -> bool
where
    F: FnOnce(&dyn TransportListener),
{
    let outcome = catch_unwind(AssertUnwindSafe(|| call(listener.as_ref())));
    if outcome.is_err() {
        warn!("listener callback panicked; suspending delivery for this transport");
    }
    outcome.is_ok()
}

/// State machine and connection slot shared by every transport flavor.
///
/// Transitions are serialized under the `conn` lock, except for the
/// worker's Connected-to-terminal moves, which are conditional swaps on the
/// shared [`StateCell`]; the cell also lets `is_connected()` stay
/// lock-free.
pub(crate) struct TransportCore {
    state: Arc<StateCell>,
    conn: Mutex<Option<ActiveConnection>>,
    listener: Arc<dyn TransportListener>,
}

impl TransportCore {
    pub(crate) fn new(listener: Arc<dyn TransportListener>) -> Self {
        Self {
            state: Arc::new(StateCell::new()),
            conn: Mutex::new(None),
            listener,
        }
    }

    pub(crate) fn state(&self) -> TransportState {
        self.state.load()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.load() == TransportState::Connected
    }

    /// Run one connect attempt produced by `establish`.
    ///
    /// Holds the connection lock for the whole attempt so that a concurrent
    /// `close()` observes either "not yet connected" or the fully installed
    /// connection, never a half-built one.
    pub(crate) async fn connect_with<F, Fut, S>(&self, establish: F) -> Result<(), TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(S, Option<usize>), TransportError>>,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut conn = self.conn.lock().await;
        if !self
            .state
            .transition(TransportState::Disconnected, TransportState::Connecting)
        {
            return Err(TransportError::ConnectFailure(format!(
                "connect is only valid on a fresh transport (state: {:?})",
                self.state.load()
            )));
        }

        match establish().await {
            Ok((stream, read_chunk)) => {
                *conn = Some(ActiveConnection::spawn(
                    stream,
                    Arc::clone(&self.listener),
                    Arc::clone(&self.state),
                    read_chunk,
                ));
                self.state.store(TransportState::Connected);
                Ok(())
            }
            Err(err) => {
                self.state.store(TransportState::Failed);
                Err(err)
            }
        }
    }

    /// Send on the live connection.
    ///
    /// A write failure is not surfaced as an I/O error here: that channel
    /// belongs to the worker's read side, which observes the same broken
    /// socket and owns the single terminal callback. The caller just learns
    /// the transport is no longer usable.
    pub(crate) async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let conn = self.conn.lock().await;
        match conn.as_ref() {
            Some(active) => match active.send(data).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    debug!(%err, "send failed on a broken connection");
                    self.state
                        .transition(TransportState::Connected, TransportState::Failed);
                    Err(TransportError::NotConnected)
                }
            },
            None => Err(TransportError::NotConnected),
        }
    }

    /// Close from any state. Safe to call repeatedly and concurrently with
    /// an in-flight connect (it waits for the attempt to settle first).
    ///
    /// Resources are released even when the worker already moved the state
    /// to Closed or Failed on its own: the release decision keys off the
    /// connection slot, not the state.
    pub(crate) async fn close(&self) {
        let mut conn = self.conn.lock().await;
        let previous = self.state.load();
        self.state.store(TransportState::Closed);
        match conn.take() {
            Some(active) => {
                active.shutdown().await;
                debug!(?previous, "transport closed");
            }
            None => {
                if previous == TransportState::Closed {
                    debug!("redundant close ignored");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct CountingListener {
        data: AtomicUsize,
        closed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl TransportListener for CountingListener {
        fn on_data(&self, data: Bytes) {
            self.data.fetch_add(data.len(), Ordering::SeqCst);
        }

        fn on_transport_closed(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_transport_error(&self, _error: TransportError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_until(check: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn peer_eof_leaves_connected_state_before_notifying() {
        let listener = Arc::new(CountingListener::default());
        let core = TransportCore::new(Arc::clone(&listener) as Arc<dyn TransportListener>);

        let (near, far) = tokio::io::duplex(64);
        core.connect_with(|| async { Ok((near, None)) }).await.unwrap();
        assert!(core.is_connected());

        drop(far);
        wait_until(|| listener.closed.load(Ordering::SeqCst) == 1).await;

        assert!(!core.is_connected());
        assert_eq!(core.state(), TransportState::Closed);
        assert_eq!(listener.errors.load(Ordering::SeqCst), 0);

        // Local close afterwards still releases the slot and stays silent.
        core.close().await;
        assert_eq!(core.state(), TransportState::Closed);
        assert_eq!(listener.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_failure_is_never_a_synchronous_io_error() {
        let listener = Arc::new(CountingListener::default());
        let core = TransportCore::new(Arc::clone(&listener) as Arc<dyn TransportListener>);

        let (near, far) = tokio::io::duplex(64);
        core.connect_with(|| async { Ok((near, None)) }).await.unwrap();

        drop(far);
        // Whether the write fails first or the worker observes EOF first,
        // the caller must see NotConnected, never Io.
        let err = core.send(Bytes::from_static(b"payload")).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected), "{err}");
        assert!(!core.is_connected());

        core.close().await;
    }
}
