//! Plain TCP transport.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::{TcpSocket, TcpStream, lookup_host};
use tracing::debug;

use crate::error::TransportError;
use crate::listener::TransportListener;
use crate::options::TransportOptions;
use crate::transport::{Transport, TransportState};
use crate::uri::TransportUri;
use crate::worker::TransportCore;

/// Transport over a raw stream socket. No content validation, no
/// certificate logic.
///
/// Connect failures are synchronous only: the listener's error callback is
/// reserved for failures after the transport reaches Connected, and the I/O
/// worker that invokes it does not exist until then.
pub struct TcpTransport {
    host: String,
    port: u16,
    options: TransportOptions,
    core: TransportCore,
}

impl TcpTransport {
    /// Create a transport for `remote` with the listener attached.
    ///
    /// No I/O happens until `connect()`.
    pub fn new(
        listener: Arc<dyn TransportListener>,
        remote: &TransportUri,
        options: TransportOptions,
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
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.core
            .connect_with(|| async {
                let stream = with_connect_timeout(
                    self.options.connect_timeout,
                    open_raw_stream(&self.host, self.port, &self.options),
                )
                .await?;
                debug!(host = %self.host, port = self.port, "TCP transport connected");
                Ok((stream, self.options.receive_buffer_size))
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

/// Bound `fut` by the configured connect timeout, mapping expiry to
/// [`TransportError::ConnectFailure`].
pub(crate) async fn with_connect_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::ConnectFailure(format!(
            "connect timed out after {timeout:?}"
        ))),
    }
}

/// Resolve `host:port` and open a stream socket with the configured buffer
/// sizes applied. Timeout handling belongs to the caller.
pub(crate) async fn open_raw_stream(
    host: &str,
    port: u16,
    options: &TransportOptions,
) -> Result<TcpStream, TransportError> {
    let addrs: Vec<_> = lookup_host((host, port))
        .await
        .map_err(|err| TransportError::ConnectFailure(format!("cannot resolve {host}: {err}")))?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::ConnectFailure(format!(
            "no addresses for {host}"
        )));
    }

    let mut last_err: Option<io::Error> = None;
    for addr in addrs {
        match connect_addr(addr, options).await {
            Ok(stream) => {
                // Latency over batching for a messaging workload.
                stream
                    .set_nodelay(true)
                    .map_err(|err| TransportError::ConnectFailure(err.to_string()))?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    let detail = last_err.map_or_else(|| "connect failed".to_string(), |err| err.to_string());
    Err(TransportError::ConnectFailure(format!(
        "cannot connect to {host}:{port}: {detail}"
    )))
}

async fn connect_addr(
    addr: std::net::SocketAddr,
    options: &TransportOptions,
) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(size) = options.send_buffer_size {
        socket.set_send_buffer_size(u32::try_from(size).unwrap_or(u32::MAX))?;
    }
    if let Some(size) = options.receive_buffer_size {
        socket.set_recv_buffer_size(u32::try_from(size).unwrap_or(u32::MAX))?;
    }
    socket.connect(addr).await
}
