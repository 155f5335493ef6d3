//! Connection options shared by every protocol adapter.

use std::time::Duration;

/// Connect/read/write timeouts and basic socket tuning.
///
/// Some options are ineffective after `connect()` has returned (e.g.
/// `no_delay` can only be applied to the socket before the handshake
/// completes on some platforms); adapters document this per field.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionOptions {
    /// Zero means "no timeout".
    pub connect_timeout: Option<Duration>,
    /// Zero means "no timeout".
    pub read_timeout: Option<Duration>,
    /// Zero means "no timeout".
    pub write_timeout: Option<Duration>,
    /// Enable TCP keep-alive probes.
    pub keep_alive: bool,
    /// Disable Nagle's algorithm.
    pub no_delay: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            keep_alive: false,
            no_delay: false,
        }
    }
}

impl ConnectionOptions {
    /// Options with no timeouts and no socket tuning.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = Some(d);
        self
    }

    /// Set the read timeout.
    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = Some(d);
        self
    }

    /// Set the write timeout.
    pub fn with_write_timeout(mut self, d: Duration) -> Self {
        self.write_timeout = Some(d);
        self
    }

    /// Enable/disable TCP keep-alive.
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Enable/disable `TCP_NODELAY`.
    pub fn with_no_delay(mut self, enabled: bool) -> Self {
        self.no_delay = enabled;
        self
    }
}
