//! Error and Result module.
//!
//! Errors are represented uniformly as `(code, message, where, details)` per
//! the error taxonomy: argument errors, lifecycle errors, I/O errors, and
//! protocol errors all share this [`Error`] type. gRPC statuses (1..16) live
//! in their own numeric space (see [`crate::grpc::status`]) so they never
//! collide with the `Kind` discriminants used here.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type returned from `netrt` operations.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// Uniform error type for the unified transport/connection/listener surface.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
    where_: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    // ----- argument errors -----
    InvalidArgument,
    /// Host was empty or otherwise unparsable.
    InvalidEndpoint,
    InvalidUrl,

    // ----- lifecycle errors -----
    AlreadyConnected,
    AlreadyRunning,
    NotConnected,
    NotRunning,
    NotListening,

    // ----- I/O errors -----
    Bind,
    Connect,
    ConnectTimeout,
    Send,
    Receive,
    Closed,
    Timeout,

    // ----- protocol errors -----
    FrameSize,
    FlowControl,
    HpackDecode,
    InvalidPreface,
    Handshake,
    InvalidFrame,

    // ----- scheduler lifecycle -----
    SchedulerUninitialized,
    PoolCreation,

    /// The factory exists but the underlying transport is opaque/unimplemented (QUIC).
    NotSupported,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl {
                kind,
                cause: None,
                where_: None,
            }),
        }
    }

    pub(crate) fn with_cause<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn with_where(mut self, where_: &'static str) -> Error {
        self.inner.where_ = Some(where_);
        self
    }

    pub(crate) fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The subsystem that raised this error, if known (e.g. `"http2"`, `"tcp::connect"`).
    pub fn location(&self) -> Option<&'static str> {
        self.inner.where_
    }

    /// Whether the operation can be retried without tearing down the owning
    /// connection or listener (a single failed `send_to` in a broadcast, a
    /// transient accept error). Connection-level protocol violations are not
    /// recoverable and imply teardown.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.inner.kind,
            Kind::FrameSize
                | Kind::FlowControl
                | Kind::HpackDecode
                | Kind::InvalidPreface
                | Kind::InvalidFrame
        )
    }

    pub(crate) fn new_io(err: io::Error, where_: &'static str) -> Error {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut => Kind::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Kind::Closed,
            _ => Kind::Send,
        };
        Error::new(kind).with_where(where_).with_cause(err)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("netrt::Error");
        f.field("kind", &self.inner.kind);
        if let Some(where_) = self.inner.where_ {
            f.field("where", &where_);
        }
        if let Some(ref cause) = self.inner.cause {
            f.field("cause", cause);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.inner.kind)?;
        if let Some(where_) = self.inner.where_ {
            write!(f, " in {where_}")?;
        }
        if let Some(ref cause) = self.inner.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.cause.as_ref().map(|c| &**c as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::new_io(err, "io")
    }
}

macro_rules! err_ctor {
    ($(#[$doc:meta] $name:ident => $kind:ident;)*) => {
        impl Error {
            $(
                #[$doc]
                pub(crate) fn $name() -> Error {
                    Error::new(Kind::$kind)
                }
            )*
        }
    }
}

err_ctor! {
    /// The caller supplied an empty host, malformed URL, or invalid port.
    #[allow(dead_code)]
    invalid_argument => InvalidArgument;
    /// `connect` was called on an already-connected transport.
    already_connected => AlreadyConnected;
    /// `start`/`connect` was called while already running.
    already_running => AlreadyRunning;
    /// An operation requiring a live connection was attempted on a closed one.
    not_connected => NotConnected;
    /// An operation requiring a running listener/executor was attempted while stopped.
    not_running => NotRunning;
    /// `send_to`/`broadcast`/`close_connection` called before `start`.
    not_listening => NotListening;
    /// `bind` failed.
    bind_failed => Bind;
    /// `connect` failed at the transport layer.
    connect_failed => Connect;
    /// `connect` did not complete within the configured timeout.
    connect_timeout => ConnectTimeout;
    /// the connect/request/keepalive timeout elapsed.
    timeout => Timeout;
    /// the peer closed the connection.
    closed => Closed;
    /// a DATA/HEADERS frame exceeded the negotiated `max_frame_size`.
    frame_size => FrameSize;
    /// a flow-control window would have gone negative.
    flow_control => FlowControl;
    /// HPACK decoding failed (bad index, truncated integer/string, ...).
    hpack_decode => HpackDecode;
    /// the connection preface did not match the literal `PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n`.
    invalid_preface => InvalidPreface;
    /// a WebSocket or HTTP/2 handshake failed.
    handshake_failed => Handshake;
    /// a malformed frame was received (bad flags, zero increment, ...).
    invalid_frame => InvalidFrame;
    /// `Scheduler::create_io_pool` was called before `Scheduler::initialize`.
    scheduler_uninitialized => SchedulerUninitialized;
    /// worker-thread creation failed during pool creation.
    pool_creation_failed => PoolCreation;
    /// the factory surface exists but the wire transport is not implemented.
    not_supported => NotSupported;
}
