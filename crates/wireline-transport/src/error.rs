//! Transport error taxonomy.
//!
//! The split between variants mirrors the reporting channel: pre-Connected
//! failures are returned synchronously from [`connect`], post-Connected
//! failures are delivered through the listener's error callback, and never
//! both for the same event.
//!
//! [`connect`]: crate::Transport::connect

use std::io;

/// Errors surfaced by the transport layer.
///
/// Retryability is the caller's decision; this layer classifies failures but
/// never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network-level refusal, unreachable host, failed name resolution, or
    /// connect timeout, before any TLS handshake begins.
    #[error("connect failed: {0}")]
    ConnectFailure(String),

    /// TLS handshake protocol error or peer certificate rejected by the
    /// configured truststore. Raised synchronously from `connect()` only.
    #[error("TLS validation failed: {0}")]
    TlsValidation(String),

    /// Operation attempted outside the Connected state.
    #[error("transport is not connected")]
    NotConnected,

    /// I/O failure after the transport reached Connected. Delivered via
    /// `on_transport_error`, never as a synchronous return.
    #[error("transport I/O error")]
    Io(#[from] io::Error),

    /// The supplied options are unusable: malformed URI, missing truststore
    /// with trust-all disabled, unreadable store material, or an empty
    /// protocol/cipher intersection.
    #[error("invalid transport configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// True when this error represents a connect-phase failure, i.e. one
    /// that is never delivered through the listener.
    pub fn is_connect_phase(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailure(_) | Self::TlsValidation(_) | Self::Config(_)
        )
    }
}
