//! Remote endpoint addressing.
//!
//! Endpoints are written `scheme://host:port`; the scheme is the factory's
//! selection tag between the plain and TLS transports.

use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Transport flavor selected by the URI scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain TCP (`tcp://`).
    Tcp,
    /// TLS over TCP (`tls://` or `ssl://`).
    Tls,
}

/// A parsed `scheme://host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportUri {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl TransportUri {
    /// Parse an endpoint URI. The port is mandatory.
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| TransportError::Config(format!("missing scheme in URI: {input}")))?;

        let scheme = match scheme {
            "tcp" => Scheme::Tcp,
            "tls" | "ssl" => Scheme::Tls,
            other => {
                return Err(TransportError::Config(format!(
                    "unsupported scheme: {other}"
                )));
            }
        };

        // IPv6 literals are bracketed (`[::1]:5672`); the stored host is
        // the bare address, brackets are a URI artifact.
        let (host, port) = if let Some(inner) = rest.strip_prefix('[') {
            inner
                .split_once("]:")
                .ok_or_else(|| TransportError::Config(format!("malformed IPv6 URI: {input}")))?
        } else {
            rest.rsplit_once(':')
                .ok_or_else(|| TransportError::Config(format!("missing port in URI: {input}")))?
        };
        if host.is_empty() {
            return Err(TransportError::Config(format!("missing host in URI: {input}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::Config(format!("invalid port in URI: {input}")))?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// Scheme tag for the factory boundary.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Remote host name or address literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Remote port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for TransportUri {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TransportUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Tcp => "tcp",
            Scheme::Tls => "tls",
        };
        if self.host.contains(':') {
            write!(f, "{scheme}://[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{scheme}://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parses_tcp_and_tls_schemes() {
        let uri = TransportUri::parse("tcp://localhost:5672").unwrap();
        assert_eq!(uri.scheme(), Scheme::Tcp);
        assert_eq!(uri.host(), "localhost");
        assert_eq!(uri.port(), 5672);

        let uri = TransportUri::parse("tls://broker.example:5671").unwrap();
        assert_eq!(uri.scheme(), Scheme::Tls);

        let uri = TransportUri::parse("ssl://127.0.0.1:1234").unwrap();
        assert_eq!(uri.scheme(), Scheme::Tls);
    }

    #[test]
    fn parses_bracketed_ipv6_hosts_without_brackets() {
        let uri = TransportUri::parse("tcp://[::1]:5672").unwrap();
        assert_eq!(uri.host(), "::1");
        assert_eq!(uri.port(), 5672);
        assert_eq!(uri.to_string(), "tcp://[::1]:5672");

        let uri = TransportUri::parse("tls://[fe80::2%eth0]:5671").unwrap();
        assert_eq!(uri.host(), "fe80::2%eth0");
        assert_eq!(uri.port(), 5671);
    }

    #[test]
    fn rejects_malformed_uris() {
        for input in [
            "localhost:5672",
            "amqp://localhost:5672",
            "tcp://localhost",
            "tcp://:5672",
            "tcp://localhost:notaport",
            "tcp://localhost:99999",
            "tcp://[::1",
            "tcp://[::1]",
            "tcp://[]:5672",
        ] {
            let err = TransportUri::parse(input).unwrap_err();
            assert!(matches!(err, TransportError::Config(_)), "{input}");
        }
    }

    #[test]
    fn display_round_trips() {
        let uri = TransportUri::parse("tls://host.example:5671").unwrap();
        assert_eq!(uri.to_string(), "tls://host.example:5671");
    }
}
