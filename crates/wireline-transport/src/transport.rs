//! The transport capability set and its lifecycle states.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;

/// Lifecycle of a single transport instance.
///
/// Transports are single-use: there is no reconnect-in-place, and `Closed`
/// is terminal from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// Created, `connect()` not called yet.
    Disconnected = 0,
    /// `connect()` in flight.
    Connecting = 1,
    /// Connection established; bytes flow bidirectionally.
    Connected = 2,
    /// `close()` was called, or the peer ended the stream.
    Closed = 3,
    /// Connect or handshake failed, or the connection broke mid-stream;
    /// only `close()` is meaningful now.
    Failed = 4,
}

/// Capability set shared by every transport flavor.
///
/// `connect()` is blocking from the caller's perspective: it returns only
/// once the connection (including TLS negotiation for secure variants) has
/// fully succeeded or failed. Failures before Connected are returned here
/// and never duplicated through the listener.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection, completing any TLS negotiation before
    /// returning.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectFailure`] for network-level failures,
    /// [`TransportError::TlsValidation`] for handshake or peer-certificate
    /// rejection, [`TransportError::Config`] for unusable options.
    async fn connect(&self) -> Result<(), TransportError>;

    /// True iff the current state is Connected. Never blocks; safe from any
    /// thread.
    fn is_connected(&self) -> bool;

    /// Current lifecycle state.
    fn state(&self) -> TransportState;

    /// Send bytes to the peer.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] outside the Connected state.
    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the transport and release its resources.
    ///
    /// Idempotent and infallible: redundant closes are ignored, and closing
    /// a transport that never connected is a no-op. Once this returns, no
    /// further listener callbacks will be delivered.
    async fn close(&self);
}

/// Lock-free mirror of the transport state.
///
/// Most transitions are serialized by the owning transport's connection
/// lock; the I/O worker additionally moves Connected to a terminal state
/// through the conditional `transition`, so `is_connected()` tracks peer
/// closes without blocking.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TransportState::Disconnected as u8))
    }

    pub(crate) fn load(&self) -> TransportState {
        match self.0.load(Ordering::Acquire) {
            0 => TransportState::Disconnected,
            1 => TransportState::Connecting,
            2 => TransportState::Connected,
            3 => TransportState::Closed,
            _ => TransportState::Failed,
        }
    }

    pub(crate) fn store(&self, state: TransportState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Transition `from -> to` only if the current state is `from`.
    pub(crate) fn transition(&self, from: TransportState, to: TransportState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn state_cell_round_trips_every_state() {
        let cell = StateCell::new();
        assert_eq!(cell.load(), TransportState::Disconnected);

        for state in [
            TransportState::Connecting,
            TransportState::Connected,
            TransportState::Closed,
            TransportState::Failed,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn transition_is_conditional() {
        let cell = StateCell::new();
        assert!(cell.transition(TransportState::Disconnected, TransportState::Connecting));
        assert!(!cell.transition(TransportState::Disconnected, TransportState::Connecting));
        assert!(cell.transition(TransportState::Connecting, TransportState::Connected));
        assert_eq!(cell.load(), TransportState::Connected);
    }
}
