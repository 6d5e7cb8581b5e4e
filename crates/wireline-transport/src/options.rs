//! Transport configuration values.
//!
//! Options are plain values: callers start from the documented default,
//! customize a copy, and hand it to a transport at construction time. The
//! transport owns its options for the lifetime of the connection and never
//! mutates them, so there is no shared mutable configuration state.
//!
//! No validation happens at construction. Whether a set of options is usable
//! is decided by `connect()`, which is where a missing truststore or
//! unreadable store material surfaces as [`TransportError::Config`].
//!
//! [`TransportError::Config`]: crate::TransportError::Config

use std::path::PathBuf;
use std::time::Duration;

/// Default connect timeout applied when the caller does not override it.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options common to every transport flavor.
///
/// `None` buffer sizes leave the OS defaults in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Upper bound on the whole `connect()` call, TLS handshake included.
    pub connect_timeout: Duration,
    /// Socket send buffer size (`SO_SNDBUF`), `None` for the OS default.
    pub send_buffer_size: Option<usize>,
    /// Socket receive buffer size (`SO_RCVBUF`), `None` for the OS default.
    pub receive_buffer_size: Option<usize>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_buffer_size: None,
            receive_buffer_size: None,
        }
    }
}

/// On-disk encoding of keystore and truststore material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    /// PEM-armored certificates and PKCS#8 private keys.
    #[default]
    Pem,
    /// A single DER-encoded certificate, or a DER-encoded private key.
    Der,
}

/// TLS-specific options layered on top of [`TransportOptions`].
///
/// Composition rather than subclassing: the embedded `transport` value is
/// what the underlying TCP connect uses, and the remaining fields only
/// matter to the TLS layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SslOptions {
    /// Options for the underlying TCP connection.
    pub transport: TransportOptions,
    /// This side's certificate chain and private key, presented to the peer
    /// during the handshake (mutual TLS). Independent of trust mode.
    pub key_store_location: Option<PathBuf>,
    /// Password for the keystore. Carried opaquely for the caller; the
    /// PEM/DER material loaded here is expected to be unencrypted.
    pub key_store_password: Option<String>,
    /// Certificate authorities used to validate the peer. Required when
    /// `trust_all` is false; ignored when it is true.
    pub trust_store_location: Option<PathBuf>,
    /// Password for the truststore. Carried opaquely, same as the keystore
    /// password.
    pub trust_store_password: Option<String>,
    /// Encoding of both stores.
    pub store_type: StoreType,
    /// Explicit insecure override: accept any peer certificate without
    /// validation.
    pub trust_all: bool,
    /// Protocol versions offered during the handshake (`"TLSv1.2"`,
    /// `"TLSv1.3"`). Empty means both.
    pub enabled_protocols: Vec<String>,
    /// Cipher suites offered, by rustls suite identifier
    /// (e.g. `TLS13_AES_256_GCM_SHA384`). Empty means the provider default.
    pub enabled_cipher_suites: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_options_are_stable() {
        let options = TransportOptions::default();
        assert_eq!(options.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(options.send_buffer_size, None);
        assert_eq!(options.receive_buffer_size, None);
    }

    #[test]
    fn customizing_a_copy_leaves_the_default_alone() {
        let mut custom = TransportOptions::default();
        custom.connect_timeout = Duration::from_secs(5);
        custom.send_buffer_size = Some(64 * 1024);

        assert_ne!(custom, TransportOptions::default());
        assert_eq!(
            TransportOptions::default().connect_timeout,
            DEFAULT_CONNECT_TIMEOUT
        );
    }

    #[test]
    fn ssl_options_compose_transport_options() {
        let mut ssl = SslOptions::default();
        ssl.transport.connect_timeout = Duration::from_secs(5);
        ssl.trust_all = true;

        assert_eq!(ssl.store_type, StoreType::Pem);
        assert_eq!(ssl.transport.connect_timeout, Duration::from_secs(5));
        assert!(ssl.trust_store_location.is_none());
    }
}
