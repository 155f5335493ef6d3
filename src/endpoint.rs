//! The `Endpoint` value and connection-id generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A `(host, port)` pair, or a full URL for URL-style protocols.
///
/// Immutable after construction; equality is field-wise. `host` may be a DNS
/// name, a literal IP address, or — for `ws://`/`wss://` endpoints — a full
/// URL whose `port` is reported as `0` (the real port lives in the URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Construct an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            host: host.into(),
            port,
        }
    }

    /// The host component: a DNS name, IP literal, or full URL.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port component. Zero for URL-style endpoints (the port, if any,
    /// is encoded in `host`).
    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn is_empty_host(&self) -> bool {
        self.host.is_empty()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 {
            write!(f, "{}", self.host)
        } else if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<(String, u16)> for Endpoint {
    fn from((host, port): (String, u16)) -> Endpoint {
        Endpoint::new(host, port)
    }
}

impl From<std::net::SocketAddr> for Endpoint {
    fn from(addr: std::net::SocketAddr) -> Endpoint {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }
}

/// Generates stable, process-unique connection ids of the form
/// `prefix-<monotonic-ns>-<sequence>` when an adapter is not given one
/// explicitly.
pub(crate) struct IdGenerator {
    prefix: &'static str,
    sequence: AtomicU64,
}

impl IdGenerator {
    pub(crate) const fn new(prefix: &'static str) -> IdGenerator {
        IdGenerator {
            prefix,
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn next(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("{}-{}-{}", self.prefix, now_ns, seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_v4() {
        let e = Endpoint::new("127.0.0.1", 8080);
        assert_eq!(e.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn endpoint_display_v6_brackets() {
        let e = Endpoint::new("::1", 8080);
        assert_eq!(e.to_string(), "[::1]:8080");
    }

    #[test]
    fn endpoint_equality_is_field_wise() {
        assert_eq!(Endpoint::new("a", 1), Endpoint::new("a", 1));
        assert_ne!(Endpoint::new("a", 1), Endpoint::new("a", 2));
    }

    #[test]
    fn id_generator_produces_unique_ids() {
        let gen = IdGenerator::new("tcp");
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
        assert!(a.starts_with("tcp-"));
    }
}
