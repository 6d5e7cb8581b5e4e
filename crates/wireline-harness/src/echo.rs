//! Single-connection echo server.
//!
//! Test-only peer for the transport layer: accepts one connection at a
//! time on an ephemeral port and writes every received byte back unchanged,
//! in order. After a connection ends it goes back to accepting, so a test
//! can connect, close, and connect again against the same server.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use wireline_transport::SslOptions;
use wireline_transport::ssl::{ensure_crypto_provider, load_cert_chain, load_private_key};

use crate::HarnessError;

/// Echo endpoint, plain or TLS depending on construction.
///
/// The TLS variant takes the same [`SslOptions`] shape the client side
/// uses; only the keystore fields matter here (they become the server
/// certificate and key).
pub struct EchoServer {
    ssl: Option<SslOptions>,
    running: Option<Running>,
}

struct Running {
    port: u16,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EchoServer {
    /// Plain TCP echo server.
    pub fn new() -> Self {
        Self {
            ssl: None,
            running: None,
        }
    }

    /// TLS echo server presenting the certificate from `options`' keystore.
    pub fn with_ssl(options: SslOptions) -> Self {
        Self {
            ssl: Some(options),
            running: None,
        }
    }

    /// Bind an ephemeral local port and start accepting.
    ///
    /// # Errors
    ///
    /// Fails when the port cannot be bound or the keystore material is
    /// unusable. Calling `start()` twice is an error.
    pub async fn start(&mut self) -> Result<(), HarnessError> {
        if self.running.is_some() {
            return Err(HarnessError::AlreadyStarted);
        }

        let acceptor = match &self.ssl {
            Some(options) => Some(build_acceptor(options)?),
            None => None,
        };

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(HarnessError::Io)?;
        let port = listener.local_addr().map_err(HarnessError::Io)?.port();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, acceptor, cancel.clone()));

        debug!(port, tls = self.ssl.is_some(), "echo server started");
        self.running = Some(Running { port, cancel, task });
        Ok(())
    }

    /// Port bound by `start()`, `None` before that.
    pub fn server_port(&self) -> Option<u16> {
        self.running.as_ref().map(|running| running.port)
    }

    /// Stop accepting and drop any live connection.
    ///
    /// Idempotent, and safe to call on a server that never started.
    pub async fn close(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(err) = running.task.await {
                debug!(?err, "echo server task did not exit cleanly");
            }
            debug!(port = running.port, "echo server closed");
        }
    }
}

impl Default for EchoServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the TLS acceptor from the server-side option set.
///
/// A configured truststore turns on mandatory client-certificate
/// verification against its roots; without one, any client is accepted.
fn build_acceptor(options: &SslOptions) -> Result<TlsAcceptor, HarnessError> {
    ensure_crypto_provider();
    let location = options
        .key_store_location
        .as_deref()
        .ok_or(HarnessError::MissingKeyStore)?;
    let chain = load_cert_chain(location, options.store_type)?;
    let key = load_private_key(location, options.store_type)?;

    let builder = match options.trust_store_location.as_deref() {
        Some(trust) => {
            let mut roots = rustls::RootCertStore::empty();
            for cert in load_cert_chain(trust, options.store_type)? {
                roots.add(cert).map_err(HarnessError::Tls)?;
            }
            let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|err| HarnessError::ClientVerifier(err.to_string()))?;
            rustls::ServerConfig::builder().with_client_cert_verifier(verifier)
        }
        None => rustls::ServerConfig::builder().with_no_client_auth(),
    };

    let config = builder
        .with_single_cert(chain, key)
        .map_err(HarnessError::Tls)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept and serve one connection at a time until cancelled.
///
/// The select is biased towards `accept` so that a connection already
/// sitting in the listen backlog when `close()` fires is still drained and
/// shut down cleanly (FIN, not a reset from dropping the listener). Once
/// the backlog is empty the cancel arm wins and the loop exits.
async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    cancel: CancellationToken,
) {
    loop {
        let (stream, peer) = tokio::select! {
            biased;
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    debug!(%err, "echo accept failed");
                    continue;
                }
            },
            () = cancel.cancelled() => return,
        };
        debug!(%peer, "echo connection accepted");
        serve(stream, acceptor.as_ref(), &cancel).await;
    }
}

async fn serve(stream: TcpStream, acceptor: Option<&TlsAcceptor>, cancel: &CancellationToken) {
    match acceptor {
        Some(acceptor) => {
            let accept = tokio::select! {
                () = cancel.cancelled() => return,
                accept = acceptor.accept(stream) => accept,
            };
            match accept {
                Ok(tls) => echo(tls, cancel).await,
                // Expected for clients that reject our certificate.
                Err(err) => debug!(%err, "TLS accept failed"),
            }
        }
        None => echo(stream, cancel).await,
    }
}

async fn echo<S>(mut stream: S, cancel: &CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => {
                // Close our side properly (FIN, close_notify for TLS) so
                // the peer observes an orderly end of stream.
                if let Err(err) = stream.shutdown().await {
                    debug!(%err, "echo shutdown failed");
                }
                return;
            }
            read = stream.read(&mut buf) => read,
        };
        match read {
            Ok(0) => return,
            Ok(n) => {
                if let Err(err) = stream.write_all(&buf[..n]).await {
                    debug!(%err, "echo write failed");
                    return;
                }
                if let Err(err) = stream.flush().await {
                    debug!(%err, "echo flush failed");
                    return;
                }
            }
            Err(err) => {
                debug!(%err, "echo read failed");
                return;
            }
        }
    }
}
