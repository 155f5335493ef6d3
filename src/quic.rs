//! QUIC factory stub (§6 of the external-interface surface).
//!
//! QUIC/HTTP-3 stream logic is explicitly out of scope: the transport is
//! consumed as an opaque duplex byte stream by every other engine in this
//! crate, and no QUIC implementation exists here. The factory functions
//! still exist so callers can depend on the full per-protocol surface
//! (`tcp`, `udp`, `websocket`, `quic`) without a missing symbol; both
//! always fail with [`crate::error::Error::not_supported`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::{Connection, Listener};

/// QUIC-specific configuration accepted by [`connect`]/[`listen`].
#[derive(Clone)]
pub struct QuicConfig {
    pub server_name: Option<String>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub idle_timeout: Option<Duration>,
    pub max_bidi_streams: u64,
    pub max_uni_streams: u64,
    pub initial_max_data: u64,
    pub initial_max_stream_data_bidi: u64,
    pub initial_max_stream_data_uni: u64,
    pub enable_early_data: bool,
    pub enable_pmtud: bool,
    pub insecure_skip_verify: bool,
}

impl Default for QuicConfig {
    fn default() -> QuicConfig {
        QuicConfig {
            server_name: None,
            cert_file: None,
            key_file: None,
            alpn_protocols: Vec::new(),
            idle_timeout: None,
            max_bidi_streams: 100,
            max_uni_streams: 100,
            initial_max_data: 10 * 1024 * 1024,
            initial_max_stream_data_bidi: 1024 * 1024,
            initial_max_stream_data_uni: 1024 * 1024,
            enable_early_data: false,
            enable_pmtud: true,
            insecure_skip_verify: false,
        }
    }
}

/// Create a QUIC connection. Always fails; see the module docs.
pub fn connect(_config: QuicConfig) -> Result<Arc<dyn Connection>> {
    Err(Error::not_supported().with_where("quic::connect: QUIC transport is not implemented"))
}

/// Create a QUIC listener. Always fails; see the module docs.
pub fn listen(_config: QuicConfig) -> Result<Arc<dyn Listener>> {
    Err(Error::not_supported().with_where("quic::listen: QUIC transport is not implemented"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_listen_report_not_supported() {
        assert!(connect(QuicConfig::default()).is_err());
        assert!(listen(QuicConfig::default()).is_err());
    }
}
