//! Callback bundles for connections and listeners.
//!
//! All four handlers in a bundle are optional and may be invoked from an I/O
//! thread. Replacing a bundle via `set_callbacks` clears the previous one
//! atomically with respect to delivery: no callback from a replaced bundle is
//! invoked after `set_callbacks` returns (the bundle is swapped under the same
//! mutex that guards delivery).

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

type ConnectedFn = dyn Fn() + Send + Sync;
type DataFn = dyn Fn(&[u8]) + Send + Sync;
type DisconnectedFn = dyn Fn() + Send + Sync;
type ConnErrorFn = dyn Fn(&Error) + Send + Sync;

/// Callback bundle installed on a [`crate::transport::Connection`].
#[derive(Clone, Default)]
pub struct ConnectionCallbacks {
    on_connected: Option<Arc<ConnectedFn>>,
    on_data: Option<Arc<DataFn>>,
    on_disconnected: Option<Arc<DisconnectedFn>>,
    on_error: Option<Arc<ConnErrorFn>>,
}

impl ConnectionCallbacks {
    /// A bundle with no handlers installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the `on_connected` handler.
    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connected = Some(Arc::new(f));
        self
    }

    /// Install the `on_data` handler.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(f));
        self
    }

    /// Install the `on_disconnected` handler.
    pub fn on_disconnected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_disconnected = Some(Arc::new(f));
        self
    }

    /// Install the `on_error` handler.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_connected(&self) {
        if let Some(ref f) = self.on_connected {
            f();
        }
    }

    pub(crate) fn fire_data(&self, data: &[u8]) {
        if let Some(ref f) = self.on_data {
            f(data);
        }
    }

    pub(crate) fn fire_disconnected(&self) {
        if let Some(ref f) = self.on_disconnected {
            f();
        }
    }

    pub(crate) fn fire_error(&self, err: &Error) {
        if let Some(ref f) = self.on_error {
            f(err);
        }
    }
}

impl fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

type AcceptFn = dyn Fn(&str) + Send + Sync;
type ListenerDataFn = dyn Fn(&str, &[u8]) + Send + Sync;
type DisconnectFn = dyn Fn(&str) + Send + Sync;
type ListenerErrorFn = dyn Fn(&str, &Error) + Send + Sync;
/// Receives ownership of a freshly accepted connection; when set, this takes
/// precedence over `on_accept(id)`.
type AcceptOwnedFn = dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync;

/// Callback bundle installed on a [`crate::transport::Listener`], keyed by
/// connection id.
#[derive(Clone, Default)]
pub struct ListenerCallbacks {
    on_accept: Option<Arc<AcceptFn>>,
    on_data: Option<Arc<ListenerDataFn>>,
    on_disconnect: Option<Arc<DisconnectFn>>,
    on_error: Option<Arc<ListenerErrorFn>>,
    accept_callback: Option<Arc<AcceptOwnedFn>>,
}

impl ListenerCallbacks {
    /// A bundle with no handlers installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the `on_accept(id)` handler.
    pub fn on_accept<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_accept = Some(Arc::new(f));
        self
    }

    /// Install the `on_data(id, bytes)` handler.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(f));
        self
    }

    /// Install the `on_disconnect(id)` handler.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Install the `on_error(id, error)` handler.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Install an ownership-taking accept callback. Takes precedence over
    /// `on_accept` when both are set.
    pub fn accept_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(Box<dyn std::any::Any + Send>) + Send + Sync + 'static,
    {
        self.accept_callback = Some(Arc::new(f));
        self
    }

    pub(crate) fn fire_accept(&self, id: &str) {
        if let Some(ref f) = self.on_accept {
            f(id);
        }
    }

    pub(crate) fn has_accept_callback(&self) -> bool {
        self.accept_callback.is_some()
    }

    pub(crate) fn fire_accept_owned(&self, conn: Box<dyn std::any::Any + Send>) {
        if let Some(ref f) = self.accept_callback {
            f(conn);
        }
    }

    pub(crate) fn fire_data(&self, id: &str, data: &[u8]) {
        if let Some(ref f) = self.on_data {
            f(id, data);
        }
    }

    pub(crate) fn fire_disconnect(&self, id: &str) {
        if let Some(ref f) = self.on_disconnect {
            f(id);
        }
    }

    pub(crate) fn fire_error(&self, id: &str, err: &Error) {
        if let Some(ref f) = self.on_error {
            f(id, err);
        }
    }
}

impl fmt::Debug for ListenerCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerCallbacks")
            .field("on_accept", &self.on_accept.is_some())
            .field("on_data", &self.on_data.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("accept_callback", &self.accept_callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replacing_bundle_drops_old_closures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let bundle = ConnectionCallbacks::new().on_data(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bundle.fire_data(b"x");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let replaced = ConnectionCallbacks::new();
        replaced.fire_data(b"x");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn accept_callback_precedence_is_queryable() {
        let bundle = ListenerCallbacks::new().accept_callback(|_| {});
        assert!(bundle.has_accept_callback());
    }
}
