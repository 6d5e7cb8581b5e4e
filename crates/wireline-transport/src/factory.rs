//! Factory boundary: URI scheme selects the transport flavor.

use std::sync::Arc;

use crate::listener::TransportListener;
use crate::options::SslOptions;
use crate::ssl::SslTransport;
use crate::tcp::TcpTransport;
use crate::transport::Transport;
use crate::uri::{Scheme, TransportUri};

/// Create the transport selected by the URI scheme.
///
/// The plain TCP branch uses only the embedded [`TransportOptions`] of the
/// supplied `options`; the TLS branch consumes them whole. Selection happens
/// by scheme tag rather than type hierarchy, so callers hold a
/// `Box<dyn Transport>` and never learn which flavor they got.
///
/// [`TransportOptions`]: crate::TransportOptions
pub fn create_transport(
    remote: &TransportUri,
    listener: Arc<dyn TransportListener>,
    options: SslOptions,
) -> Box<dyn Transport> {
    match remote.scheme() {
        Scheme::Tcp => Box::new(TcpTransport::new(listener, remote, options.transport)),
        Scheme::Tls => Box::new(SslTransport::new(listener, remote, options)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::listener::NoopListener;
    use crate::transport::TransportState;

    #[test]
    fn factory_selects_by_scheme_and_starts_disconnected() {
        let tcp_uri = TransportUri::parse("tcp://localhost:5672").unwrap();
        let tls_uri = TransportUri::parse("tls://localhost:5671").unwrap();

        for uri in [tcp_uri, tls_uri] {
            let transport =
                create_transport(&uri, Arc::new(NoopListener), SslOptions::default());
            assert_eq!(transport.state(), TransportState::Disconnected);
            assert!(!transport.is_connected());
        }
    }
}
