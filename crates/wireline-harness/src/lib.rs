//! Test collaborators for the Wireline transport layer.
//!
//! An [`EchoServer`] that returns received bytes unmodified (plain or TLS)
//! and a [`CertFixture`] of generated certificate stores. Production crates
//! only ever dev-depend on this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certs;
pub mod echo;

pub use certs::CertFixture;
pub use echo::EchoServer;

use wireline_transport::TransportError;

/// Failures inside the test collaborators.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Socket or filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server-side TLS configuration was rejected by rustls.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate generation failed.
    #[error("certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    /// Store material could not be loaded.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Client-certificate verifier could not be built from the truststore.
    #[error("client verifier rejected the truststore: {0}")]
    ClientVerifier(String),

    /// `start()` called on a server that is already running.
    #[error("echo server is already started")]
    AlreadyStarted,

    /// TLS echo server constructed without a keystore location.
    #[error("TLS echo server requires a keystore location")]
    MissingKeyStore,
}
