//! The unified `Transport` / `Connection` / `Listener` contracts (§4.3).
//!
//! The legacy protocol-specific client/server/session interfaces are
//! collapsed into these three traits. Protocol-specific configuration (QUIC
//! ALPN lists, WebSocket paths, ...) is accepted by the per-protocol factory
//! functions in [`crate::tcp`], [`crate::udp`], [`crate::websocket`] and
//! [`crate::http2`], never by the common surface.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::options::ConnectionOptions;

/// A future boxed for storage behind a trait object.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Base contract shared by every connected transport.
///
/// `send` may be invoked concurrently by multiple callers; implementations
/// must serialize the writes themselves (the caller observes one logical
/// ordering per call, not necessarily submission order across callers).
pub trait Transport: Send + Sync {
    /// Queue `data` for transmission. Completion is implicit; failures
    /// surface through the installed `on_error` callback as well as the
    /// returned future.
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>>;

    /// Whether the transport is currently connected and usable.
    fn is_connected(&self) -> bool;

    /// The stable, process-unique connection id.
    fn id(&self) -> &str;

    /// The remote peer's endpoint, if connected.
    fn remote_endpoint(&self) -> Option<Endpoint>;

    /// The local endpoint, if bound/connected.
    fn local_endpoint(&self) -> Option<Endpoint>;
}

/// An active, client-initiated (or accepted) connection.
pub trait Connection: Transport {
    /// Connect to `endpoint`. Fails if already connected, if `endpoint` has
    /// an empty host, on resolution failure, on connect timeout, or on
    /// protocol handshake failure.
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>>;

    /// Connect using a URL (WebSocket and other URL-style protocols).
    fn connect_url(&self, url: &str) -> BoxFuture<'_, Result<()>>;

    /// Initiate a graceful close. Non-blocking; `wait_for_stop` observes
    /// completion.
    fn close(&self);

    /// Replace the callback bundle. Establishes a happens-before edge: no
    /// callback from the replaced bundle is delivered after this call
    /// returns.
    fn set_callbacks(&self, callbacks: ConnectionCallbacks);

    /// Replace the connection options. Some fields are ineffective once
    /// `connect` has returned.
    fn set_options(&self, options: ConnectionOptions);

    /// Shorthand for setting just `connect_timeout`.
    fn set_timeout(&self, timeout: Duration);

    /// Whether `connect` was called but has not yet resolved.
    fn is_connecting(&self) -> bool;

    /// Block until the connection has fully stopped.
    fn wait_for_stop(&self) -> BoxFuture<'_, ()>;
}

/// A passive acceptor of connections.
///
/// `broadcast` is best-effort: it succeeds iff at least one send succeeded;
/// per-connection failures are surfaced through `on_error`.
pub trait Listener: Send + Sync {
    /// Start listening on `endpoint`.
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>>;

    /// Stop listening; accepted sessions are closed.
    fn stop(&self) -> BoxFuture<'_, ()>;

    /// Replace the callback bundle keyed by connection id.
    fn set_callbacks(&self, callbacks: ListenerCallbacks);

    /// Install an ownership-taking accept callback, which takes precedence
    /// over `on_accept(id)` in the callback bundle when both are set.
    fn set_accept_callback(
        &self,
        f: std::sync::Arc<dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync>,
    );

    /// Whether `start` has completed and the listener is bound.
    fn is_listening(&self) -> bool;

    /// The bound local endpoint, if listening.
    fn local_endpoint(&self) -> Option<Endpoint>;

    /// Current number of live accepted connections.
    fn connection_count(&self) -> usize;

    /// Send to one accepted connection by id.
    fn send_to(&self, id: &str, data: Vec<u8>) -> BoxFuture<'_, Result<()>>;

    /// Send to every accepted connection. Succeeds iff at least one send
    /// succeeded.
    fn broadcast(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>>;

    /// Force-close one accepted connection by id.
    fn close_connection(&self, id: &str) -> BoxFuture<'_, Result<()>>;

    /// Block until the listener has fully stopped.
    fn wait_for_stop(&self) -> BoxFuture<'_, ()>;
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("id", &self.id())
            .field("is_connected", &self.is_connected())
            .finish()
    }
}
