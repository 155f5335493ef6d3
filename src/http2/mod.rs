//! The HTTP/2 engine (RFC 7540 + HPACK RFC 7541) and its [`crate::transport`]
//! adapter.
//!
//! [`connect`]/[`listen`] produce the same `Connection`/`Listener` trait
//! objects every other protocol in this crate does; `send` on the adapter
//! issues one unary request per call (method/path are fixed placeholders —
//! callers that need real request shaping, headers, or streaming use
//! [`Http2Connection::engine`] to reach the richer [`connection::Engine`]
//! API directly, which is what [`crate::grpc`] builds on).

pub mod connection;
pub mod frame;
pub mod hpack;
pub mod settings;
pub mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::Notify;

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::{Endpoint, IdGenerator};
use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{BoxFuture, Connection, Listener, Transport};

pub use connection::{Engine, Http2Response, IncomingStream, StreamHandle};
pub use stream::StreamEvent;

static CONN_IDS: IdGenerator = IdGenerator::new("h2");

/// Create an unconnected HTTP/2 connection. Call [`Connection::connect`] to
/// dial out and perform the preface/SETTINGS handshake.
pub fn connect() -> Arc<dyn Connection> {
    Http2Connection::new(CONN_IDS.next())
}

/// Create an HTTP/2 listener.
pub fn listen() -> Arc<dyn Listener> {
    Arc::new(Http2ListenerAdapter::new())
}

struct Http2State {
    engine: Option<Arc<Engine>>,
    remote: Option<Endpoint>,
    local: Option<Endpoint>,
}

/// The `Connection`/`Transport` adapter over one [`Engine`].
pub struct Http2Connection {
    id: String,
    weak_self: std::sync::Weak<Http2Connection>,
    state: tokio::sync::Mutex<Http2State>,
    connected: AtomicBool,
    connecting: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    options: std::sync::Mutex<ConnectionOptions>,
    stopped: Notify,
}

impl Http2Connection {
    fn new(id: String) -> Arc<Http2Connection> {
        Arc::new_cyclic(|weak| Http2Connection {
            id,
            weak_self: weak.clone(),
            state: tokio::sync::Mutex::new(Http2State {
                engine: None,
                remote: None,
                local: None,
            }),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            callbacks: std::sync::Mutex::new(ConnectionCallbacks::new()),
            options: std::sync::Mutex::new(ConnectionOptions::new()),
            stopped: Notify::new(),
        })
    }

    /// Reach the underlying engine for request/response or streaming calls
    /// beyond the common `Transport::send` surface.
    pub async fn engine(&self) -> Option<Arc<Engine>> {
        self.state.lock().await.engine.clone()
    }

    fn callbacks(&self) -> ConnectionCallbacks {
        self.callbacks.lock().unwrap().clone()
    }

    async fn adopt(&self, stream: TcpStream, remote: std::net::SocketAddr, local: std::net::SocketAddr, is_server: bool) -> Result<()> {
        let engine = if is_server {
            Engine::handshake_server(stream).await?
        } else {
            Engine::handshake_client(stream).await?
        };
        {
            let mut state = self.state.lock().await;
            state.engine = Some(engine.clone());
            state.remote = Some(remote.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        debug!(id = %self.id, remote = %remote, is_server, "http2 connection established");

        let this = self.weak_self.upgrade().expect("connection outlives its own watch loop");
        tokio::spawn(async move {
            engine.wait_closed().await;
            this.connected.store(false, Ordering::SeqCst);
            this.callbacks().fire_disconnected();
            this.stopped.notify_waiters();
        });
        Ok(())
    }
}

impl Transport for Http2Connection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let engine = self
                .state
                .lock()
                .await
                .engine
                .clone()
                .ok_or_else(|| Error::not_connected().with_where("http2::send"))?;
            let pseudo = vec![
                (":method".to_string(), "POST".to_string()),
                (":scheme".to_string(), "https".to_string()),
                (":path".to_string(), "/".to_string()),
            ];
            let response = engine.send_request(pseudo, Vec::new(), Bytes::from(data)).await?;
            self.callbacks().fire_data(&response.body);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn remote_endpoint(&self) -> Option<Endpoint> {
        self.state.try_lock().ok().and_then(|s| s.remote.clone())
    }

    fn local_endpoint(&self) -> Option<Endpoint> {
        self.state.try_lock().ok().and_then(|s| s.local.clone())
    }
}

impl Connection for Http2Connection {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Err(Error::already_connected().with_where("http2::connect"));
            }
            if self.connecting.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("http2::connect"));
            }
            let result = self.do_connect(endpoint).await;
            self.connecting.store(false, Ordering::SeqCst);
            result
        })
    }

    fn connect_url(&self, _url: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(Error::invalid_argument().with_where("http2::connect_url: HTTP/2 has no URL form")) })
    }

    fn close(&self) {
        let state = &self.state;
        let connected = &self.connected;
        let stopped = &self.stopped;
        if let Ok(guard) = state.try_lock() {
            if let Some(engine) = guard.engine.clone() {
                tokio::spawn(async move { engine.close().await });
            }
        }
        connected.store(false, Ordering::SeqCst);
        stopped.notify_waiters();
    }

    fn set_callbacks(&self, callbacks: ConnectionCallbacks) {
        *self.callbacks.lock().unwrap() = callbacks;
    }

    fn set_options(&self, options: ConnectionOptions) {
        *self.options.lock().unwrap() = options;
    }

    fn set_timeout(&self, timeout: Duration) {
        self.options.lock().unwrap().connect_timeout = Some(timeout);
    }

    fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    fn wait_for_stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !self.connected.load(Ordering::SeqCst) {
                return;
            }
            self.stopped.notified().await;
        })
    }
}

impl Http2Connection {
    async fn do_connect(&self, endpoint: Endpoint) -> Result<()> {
        if endpoint.is_empty_host() {
            return Err(Error::invalid_argument().with_where("http2::connect: empty host"));
        }
        let addr = crate::io::resolve(&endpoint).await?;
        let connect_timeout = self.options.lock().unwrap().connect_timeout;
        let stream = match connect_timeout {
            Some(d) => tokio::time::timeout(d, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::connect_timeout().with_where("http2::connect"))?
                .map_err(|e| Error::new_io(e, "http2::connect"))?,
            None => TcpStream::connect(addr).await.map_err(|e| Error::new_io(e, "http2::connect"))?,
        };
        let local = stream.local_addr().map_err(|e| Error::new_io(e, "http2::connect"))?;
        self.adopt(stream, addr, local, false).await
    }

    fn from_accepted(stream: TcpStream, remote: std::net::SocketAddr, local: std::net::SocketAddr) -> Arc<Http2Connection> {
        let conn = Http2Connection::new(CONN_IDS.next());
        let c = conn.clone();
        tokio::spawn(async move {
            let _ = c.adopt(stream, remote, local, true).await;
        });
        conn
    }
}

struct ListenerState {
    listening: AtomicBool,
    local: std::sync::Mutex<Option<Endpoint>>,
    callbacks: std::sync::Mutex<ListenerCallbacks>,
    registry: ConnectionRegistry<Arc<Http2Connection>>,
    stop: Notify,
    stopped: Notify,
}

struct Http2ListenerAdapter {
    state: Arc<ListenerState>,
}

impl Http2ListenerAdapter {
    fn new() -> Http2ListenerAdapter {
        Http2ListenerAdapter {
            state: Arc::new(ListenerState {
                listening: AtomicBool::new(false),
                local: std::sync::Mutex::new(None),
                callbacks: std::sync::Mutex::new(ListenerCallbacks::new()),
                registry: ConnectionRegistry::new(),
                stop: Notify::new(),
                stopped: Notify::new(),
            }),
        }
    }
}

async fn accept_loop(state: Arc<ListenerState>, listener: TokioTcpListener) {
    loop {
        let accepted = tokio::select! {
            r = listener.accept() => r,
            _ = state.stop.notified() => break,
        };
        match accepted {
            Ok((stream, remote)) => {
                let local = stream.local_addr().unwrap_or(remote);
                let conn = Http2Connection::from_accepted(stream, remote, local);
                trace!(id = %conn.id(), remote = %remote, "http2 accept");
                let callbacks = state.callbacks.lock().unwrap().clone();
                callbacks.fire_accept(conn.id());
                state
                    .registry
                    .insert(conn.id().to_string(), remote.to_string(), conn);
            }
            Err(e) if crate::io::is_connection_error(&e) => continue,
            Err(_) => tokio::time::sleep(Duration::from_secs(1)).await,
        }
    }
    state.listening.store(false, Ordering::SeqCst);
    state.stopped.notify_waiters();
}

impl Listener for Http2ListenerAdapter {
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.listening.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("http2::listen"));
            }
            let addr = crate::io::resolve(&endpoint).await?;
            let listener = TokioTcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind_failed().with_where("http2::bind").with_cause(e))?;
            let local = listener.local_addr().map_err(|e| Error::new_io(e, "http2::bind"))?;
            *self.state.local.lock().unwrap() = Some(local.into());
            let state = self.state.clone();
            tokio::spawn(accept_loop(state, listener));
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.state.stop.notify_waiters();
        })
    }

    fn set_callbacks(&self, callbacks: ListenerCallbacks) {
        *self.state.callbacks.lock().unwrap() = callbacks;
    }

    fn set_accept_callback(&self, f: Arc<dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync>) {
        let mut callbacks = self.state.callbacks.lock().unwrap();
        *callbacks = std::mem::take(&mut *callbacks).accept_callback(move |c| f(c));
    }

    fn is_listening(&self) -> bool {
        self.state.listening.load(Ordering::SeqCst)
    }

    fn local_endpoint(&self) -> Option<Endpoint> {
        self.state.local.lock().unwrap().clone()
    }

    fn connection_count(&self) -> usize {
        self.state.registry.len()
    }

    fn send_to(&self, id: &str, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        let conn = self.state.registry.get(id);
        Box::pin(async move {
            match conn {
                Some(c) => c.send(data).await,
                None => Err(Error::not_connected().with_where("http2::send_to")),
            }
        })
    }

    fn broadcast(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        let snapshot = self.state.registry.snapshot();
        Box::pin(async move {
            let mut any_ok = false;
            for (_, conn) in snapshot {
                if conn.send(data.clone()).await.is_ok() {
                    any_ok = true;
                }
            }
            if any_ok {
                Ok(())
            } else {
                Err(Error::not_connected().with_where("http2::broadcast"))
            }
        })
    }

    fn close_connection(&self, id: &str) -> BoxFuture<'_, Result<()>> {
        let conn = self.state.registry.remove(id);
        Box::pin(async move {
            match conn {
                Some(c) => {
                    c.close();
                    Ok(())
                }
                None => Err(Error::not_connected().with_where("http2::close_connection")),
            }
        })
    }

    fn wait_for_stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !self.state.listening.load(Ordering::SeqCst) {
                return;
            }
            self.state.stopped.notified().await;
        })
    }
}
