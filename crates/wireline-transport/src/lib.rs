//! Pluggable network transport layer for the Wireline messaging client.
//!
//! Upper protocol layers (framing, session state machines) send and receive
//! bytes over either a plain TCP socket or a TLS-secured socket without
//! knowing which. The interesting part is the lifecycle and trust
//! establishment: `connect()` completes the whole sequence, TLS handshake
//! and peer validation included, before it returns, and every failure is
//! reported exactly once — connect-phase failures through the synchronous
//! result, post-Connected failures through the attached
//! [`TransportListener`].
//!
//! # Components
//!
//! - [`options`]: configuration values ([`TransportOptions`], [`SslOptions`])
//! - [`transport`]: the [`Transport`] capability set and lifecycle states
//! - [`listener`]: the [`TransportListener`] callback contract
//! - [`tcp`]: [`TcpTransport`] over a raw stream socket
//! - [`ssl`]: [`SslTransport`] composing the raw channel with rustls
//! - [`uri`]: `scheme://host:port` endpoint addressing
//! - [`factory`]: scheme-based transport selection
//!
//! Transports are single-use: one instance per physical connection attempt,
//! no reconnect-in-place. Retry and failover policy belong to the caller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod factory;
pub mod listener;
pub mod options;
pub mod ssl;
pub mod tcp;
pub mod transport;
pub mod uri;

mod worker;

pub use error::TransportError;
pub use factory::create_transport;
pub use listener::{NoopListener, TransportListener};
pub use options::{DEFAULT_CONNECT_TIMEOUT, SslOptions, StoreType, TransportOptions};
pub use ssl::SslTransport;
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportState};
pub use uri::{Scheme, TransportUri};
