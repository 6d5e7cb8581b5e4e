//! TLS-secured transport.
//!
//! Composes the raw TCP channel from [`crate::tcp`] with a rustls client
//! session. Trust establishment happens entirely inside `connect()`: the
//! handshake and peer-certificate validation complete (or fail) before the
//! call returns, which is why a connect-time TLS failure can never reach the
//! listener's error callback.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use bytes::Bytes;
use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::crypto::WebPkiSupportedAlgorithms;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::TransportError;
use crate::listener::TransportListener;
use crate::options::{SslOptions, StoreType};
use crate::tcp::{open_raw_stream, with_connect_timeout};
use crate::transport::{Transport, TransportState};
use crate::uri::TransportUri;
use crate::worker::TransportCore;

/// Transport over TLS on a raw TCP channel.
///
/// Peer validation follows the configured truststore unless `trust_all` is
/// set, in which case validation is skipped unconditionally. A configured
/// keystore is presented to the peer during the handshake (mutual TLS)
/// independently of the trust mode.
pub struct SslTransport {
    host: String,
    port: u16,
    options: SslOptions,
    core: TransportCore,
}

impl SslTransport {
    /// Create a transport for `remote` with the listener attached.
    ///
    /// No I/O and no option validation happens until `connect()`.
    pub fn new(
        listener: Arc<dyn TransportListener>,
        remote: &TransportUri,
        options: SslOptions,
    ) -> Self {
        Self {
            host: remote.host().to_string(),
            port: remote.port(),
            options,
            core: TransportCore::new(listener),
        }
    }
}

#[async_trait]
impl Transport for SslTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.core
            .connect_with(|| async {
                let config = build_client_config(&self.options)?;
                let connector = TlsConnector::from(Arc::new(config));
                let server_name = ServerName::try_from(self.host.clone()).map_err(|err| {
                    TransportError::Config(format!("invalid server name {}: {err}", self.host))
                })?;

                // One budget covers the raw connect and the handshake.
                let timeout = self.options.transport.connect_timeout;
                let stream = with_connect_timeout(timeout, async {
                    let tcp = open_raw_stream(&self.host, self.port, &self.options.transport).await?;
                    connector.connect(server_name, tcp).await.map_err(|err| {
                        TransportError::TlsValidation(format!(
                            "handshake with {}:{} failed: {err}",
                            self.host, self.port
                        ))
                    })
                })
                .await?;

                debug!(host = %self.host, port = self.port, "TLS transport connected");
                Ok((stream, self.options.transport.receive_buffer_size))
            })
            .await
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn state(&self) -> TransportState {
        self.core.state()
    }

    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        self.core.send(data).await
    }

    async fn close(&self) {
        self.core.close().await;
    }
}

/// Install the ring provider as the process default, once.
///
/// Harmless if another component already installed a provider. Exposed so
/// that collaborators building their own rustls configuration (the test
/// echo server's TLS acceptor, for one) share the same provider setup.
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Translate [`SslOptions`] into a rustls client configuration.
///
/// All option problems surface here as [`TransportError::Config`]; nothing
/// in this function talks to the network.
pub(crate) fn build_client_config(options: &SslOptions) -> Result<ClientConfig, TransportError> {
    ensure_crypto_provider();

    let mut provider = rustls::crypto::ring::default_provider();
    if !options.enabled_cipher_suites.is_empty() {
        provider.cipher_suites.retain(|suite| {
            let name = format!("{:?}", suite.suite());
            options.enabled_cipher_suites.iter().any(|want| *want == name)
        });
        if provider.cipher_suites.is_empty() {
            return Err(TransportError::Config(format!(
                "no supported cipher suites among {:?}",
                options.enabled_cipher_suites
            )));
        }
    }
    let algorithms = provider.signature_verification_algorithms;

    let builder = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&enabled_versions(&options.enabled_protocols)?)
        .map_err(|err| TransportError::Config(format!("unusable protocol versions: {err}")))?;

    let builder = if options.trust_all {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { algorithms }))
    } else {
        let location = options.trust_store_location.as_deref().ok_or_else(|| {
            TransportError::Config(
                "no truststore configured and trust_all is disabled".to_string(),
            )
        })?;
        let mut roots = RootCertStore::empty();
        for cert in load_cert_chain(location, options.store_type)? {
            roots.add(cert).map_err(|err| {
                TransportError::Config(format!(
                    "rejected certificate in truststore {}: {err}",
                    location.display()
                ))
            })?;
        }
        if roots.is_empty() {
            return Err(TransportError::Config(format!(
                "truststore {} contains no certificates",
                location.display()
            )));
        }
        builder.with_root_certificates(roots)
    };

    let config = match &options.key_store_location {
        Some(location) => {
            let chain = load_cert_chain(location, options.store_type)?;
            let key = load_private_key(location, options.store_type)?;
            builder.with_client_auth_cert(chain, key).map_err(|err| {
                TransportError::Config(format!(
                    "unusable keystore {}: {err}",
                    location.display()
                ))
            })?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

fn enabled_versions(
    names: &[String],
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, TransportError> {
    if names.is_empty() {
        return Ok(rustls::ALL_VERSIONS.to_vec());
    }
    names
        .iter()
        .map(|name| match name.as_str() {
            "TLSv1.2" => Ok(&rustls::version::TLS12),
            "TLSv1.3" => Ok(&rustls::version::TLS13),
            other => Err(TransportError::Config(format!(
                "unsupported protocol version: {other}"
            ))),
        })
        .collect()
}

/// Load a certificate chain from a keystore or truststore file.
pub fn load_cert_chain(
    path: &Path,
    store_type: StoreType,
) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    match store_type {
        StoreType::Pem => {
            let file = File::open(path).map_err(|err| {
                TransportError::Config(format!("cannot open store {}: {err}", path.display()))
            })?;
            let mut reader = BufReader::new(file);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| {
                    TransportError::Config(format!(
                        "cannot parse certificates in {}: {err}",
                        path.display()
                    ))
                })?;
            if certs.is_empty() {
                return Err(TransportError::Config(format!(
                    "no certificates in {}",
                    path.display()
                )));
            }
            Ok(certs)
        }
        StoreType::Der => {
            let bytes = std::fs::read(path).map_err(|err| {
                TransportError::Config(format!("cannot read store {}: {err}", path.display()))
            })?;
            Ok(vec![CertificateDer::from(bytes)])
        }
    }
}

/// Load the private key from a keystore file.
pub fn load_private_key(
    path: &Path,
    store_type: StoreType,
) -> Result<PrivateKeyDer<'static>, TransportError> {
    match store_type {
        StoreType::Pem => {
            let file = File::open(path).map_err(|err| {
                TransportError::Config(format!("cannot open keystore {}: {err}", path.display()))
            })?;
            let mut reader = BufReader::new(file);
            rustls_pemfile::private_key(&mut reader)
                .map_err(|err| {
                    TransportError::Config(format!(
                        "cannot parse private key in {}: {err}",
                        path.display()
                    ))
                })?
                .ok_or_else(|| {
                    TransportError::Config(format!("no private key in {}", path.display()))
                })
        }
        StoreType::Der => {
            let bytes = std::fs::read(path).map_err(|err| {
                TransportError::Config(format!("cannot read keystore {}: {err}", path.display()))
            })?;
            PrivateKeyDer::try_from(bytes).map_err(|err| {
                TransportError::Config(format!(
                    "cannot parse DER private key in {}: {err}",
                    path.display()
                ))
            })
        }
    }
}

/// Verifier installed by trust-all mode: accepts any peer certificate.
///
/// Signature checks are also waived; the connection is still encrypted but
/// the peer is unauthenticated.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn trust_all_builds_without_a_truststore() {
        let options = SslOptions {
            trust_all: true,
            ..SslOptions::default()
        };
        assert!(build_client_config(&options).is_ok());
    }

    #[test]
    fn missing_truststore_is_a_config_error() {
        let options = SslOptions::default();
        let err = build_client_config(&options).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
        assert!(err.to_string().contains("truststore"));
    }

    #[test]
    fn unknown_protocol_version_is_a_config_error() {
        let options = SslOptions {
            trust_all: true,
            enabled_protocols: vec!["SSLv3".to_string()],
            ..SslOptions::default()
        };
        let err = build_client_config(&options).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[test]
    fn unknown_cipher_suites_are_a_config_error() {
        let options = SslOptions {
            trust_all: true,
            enabled_cipher_suites: vec!["TLS_NULL_WITH_NULL_NULL".to_string()],
            ..SslOptions::default()
        };
        let err = build_client_config(&options).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }

    #[test]
    fn named_protocol_versions_are_honored() {
        let options = SslOptions {
            trust_all: true,
            enabled_protocols: vec!["TLSv1.3".to_string()],
            ..SslOptions::default()
        };
        assert!(build_client_config(&options).is_ok());
    }

    #[test]
    fn missing_store_file_is_a_config_error() {
        let options = SslOptions {
            trust_store_location: Some("/nonexistent/truststore.pem".into()),
            ..SslOptions::default()
        };
        let err = build_client_config(&options).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
