//! Byte-stream transports shared by the TCP, TLS and WebSocket adapters
//! (§4.2, C2).

mod tcp;
#[cfg(feature = "tls")]
mod tls;

pub use tcp::{connect as tcp_connect, listen as tcp_listen};
#[cfg(feature = "tls")]
pub use tls::{connect as tls_connect, listen as tls_listen, TlsAcceptorConfig, TlsConnectorConfig};

use std::net::SocketAddr;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

pub(crate) async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr> {
    if endpoint.is_empty_host() {
        return Err(Error::invalid_argument().with_where("io::resolve"));
    }
    let addr_str = endpoint.to_string();
    tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::new_io(e, "io::resolve"))?
        .next()
        .ok_or_else(|| Error::invalid_argument().with_where("io::resolve"))
}

pub(crate) fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}
