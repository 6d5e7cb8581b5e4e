//! Listener contract for inbound data and terminal connection events.

use bytes::Bytes;

use crate::error::TransportError;

/// Callbacks invoked by the I/O worker that owns a connection.
///
/// Delivery contract:
/// - `on_data` calls are in arrival order and carry decrypted application
///   bytes only.
/// - At most one terminal notification (`on_transport_closed` or
///   `on_transport_error`) is delivered per transport, and only after the
///   transport reached Connected. Connect-phase failures are returned
///   synchronously from `connect()` instead.
/// - Callbacks run on the worker task and must not block significantly. A
///   panic inside a callback terminates delivery for that transport but does
///   not corrupt its state; `close()` still behaves normally.
pub trait TransportListener: Send + Sync + 'static {
    /// Inbound application bytes, in order.
    fn on_data(&self, data: Bytes);

    /// The peer closed the connection, or it ended cleanly after Connected.
    fn on_transport_closed(&self);

    /// An I/O failure occurred after the transport reached Connected.
    fn on_transport_error(&self, error: TransportError);
}

/// Listener that ignores every event.
///
/// A separate helper rather than default trait methods, so that real
/// implementations are forced to handle all three callbacks explicitly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TransportListener for NoopListener {
    fn on_data(&self, _data: Bytes) {}

    fn on_transport_closed(&self) {}

    fn on_transport_error(&self, _error: TransportError) {}
}
