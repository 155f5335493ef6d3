//! The WebSocket protocol adapter (RFC 6455, §4.7, C9).
//!
//! Handshake and framing are split out so both client and server paths share
//! one masking/fragmentation implementation; only the HTTP upgrade exchange
//! differs by direction.

mod frame;
mod handshake;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::{Mutex as AsyncMutex, Notify};

pub use frame::{Frame, Opcode};

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::{Endpoint, IdGenerator};
use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{BoxFuture, Connection, Listener, Transport};

static CONN_IDS: IdGenerator = IdGenerator::new("ws");

/// Create an unconnected WebSocket client. Call [`Connection::connect_url`]
/// with a `ws://` or `wss://` URL.
pub fn connect() -> Arc<dyn Connection> {
    WsConnection::new(CONN_IDS.next())
}

/// Create a WebSocket listener accepting upgrade requests at `path`.
pub fn listen(path: impl Into<String>) -> Arc<dyn Listener> {
    Arc::new(WsListenerAdapter::new(path.into()))
}

struct State {
    write_half: Option<OwnedWriteHalf>,
    remote: Option<Endpoint>,
    local: Option<Endpoint>,
}

struct WsConnection {
    id: String,
    weak_self: std::sync::Weak<WsConnection>,
    state: AsyncMutex<State>,
    connected: AtomicBool,
    connecting: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    options: std::sync::Mutex<ConnectionOptions>,
    stopped: Notify,
}

impl WsConnection {
    fn new(id: String) -> Arc<WsConnection> {
        Arc::new_cyclic(|weak| WsConnection {
            id,
            weak_self: weak.clone(),
            state: AsyncMutex::new(State {
                write_half: None,
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

    fn callbacks(&self) -> ConnectionCallbacks {
        self.callbacks.lock().unwrap().clone()
    }

    async fn do_connect_url(&self, url: &str) -> Result<()> {
        let parsed = handshake::parse_ws_url(url)?;
        let addr_str = format!("{}:{}", parsed.host, parsed.port);
        let addr = tokio::net::lookup_host(&addr_str)
            .await
            .map_err(|e| Error::new_io(e, "websocket::connect"))?
            .next()
            .ok_or_else(|| Error::invalid_argument().with_where("websocket::connect"))?;
        let connect_timeout = self.options.lock().unwrap().connect_timeout;
        let mut tcp = match connect_timeout {
            Some(d) => tokio::time::timeout(d, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::connect_timeout().with_where("websocket::connect"))?
                .map_err(|e| Error::new_io(e, "websocket::connect"))?,
            None => TcpStream::connect(addr)
                .await
                .map_err(|e| Error::new_io(e, "websocket::connect"))?,
        };
        let local = tcp
            .local_addr()
            .map_err(|e| Error::new_io(e, "websocket::connect"))?;
        handshake::client_handshake(&mut tcp, &parsed).await?;

        let (read_half, write_half) = tcp.into_split();
        {
            let mut state = self.state.lock().await;
            state.write_half = Some(write_half);
            state.remote = Some(addr.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        debug!(id = %self.id, remote = %addr, "websocket handshake complete");
        let this = self.weak_self.upgrade().expect("connection outlives its own read loop");
        tokio::spawn(async move {
            this.read_loop(read_half).await;
        });
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut read_half: OwnedReadHalf) {
        let mut reassembly = frame::Reassembler::new();
        loop {
            match frame::read_frame(&mut read_half).await {
                Ok(Some(f)) => {
                    if let Some(message) = reassembly.feed(f) {
                        match message {
                            frame::Message::Data(bytes) => self.callbacks().fire_data(&bytes),
                            frame::Message::Close => break,
                            frame::Message::Ping(payload) => {
                                let pong = Frame::control(Opcode::Pong, payload);
                                let mut state = self.state.lock().await;
                                if let Some(w) = state.write_half.as_mut() {
                                    let _ = frame::write_frame(w, &pong, true).await;
                                }
                            }
                            frame::Message::Pong => {}
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(id = %self.id, error = %e, "websocket frame read failed");
                    self.callbacks().fire_error(&e);
                    break;
                }
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.state.lock().await.write_half = None;
        self.callbacks().fire_disconnected();
        self.stopped.notify_waiters();
    }
}

impl Transport for WsConnection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.write_half.as_mut() {
                Some(w) => {
                    let frame = Frame::binary(data);
                    frame::write_frame(w, &frame, true)
                        .await
                        .map_err(|e| Error::new_io(e, "websocket::send"))
                }
                None => Err(Error::not_connected().with_where("websocket::send")),
            }
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

impl Connection for WsConnection {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let scheme = if endpoint.port() == 443 { "wss" } else { "ws" };
            let url = format!("{scheme}://{endpoint}");
            self.connect_url(&url).await
        })
    }

    fn connect_url(&self, url: &str) -> BoxFuture<'_, Result<()>> {
        let url = url.to_string();
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Err(Error::already_connected().with_where("websocket::connect"));
            }
            if self.connecting.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("websocket::connect"));
            }
            let result = self.do_connect_url(&url).await;
            self.connecting.store(false, Ordering::SeqCst);
            result
        })
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.try_lock() {
            state.write_half = None;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.stopped.notify_waiters();
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

struct ListenerState {
    path: String,
    listening: AtomicBool,
    local: std::sync::Mutex<Option<Endpoint>>,
    callbacks: std::sync::Mutex<ListenerCallbacks>,
    registry: ConnectionRegistry<Arc<WsConnection>>,
    stop: Notify,
    stopped: Notify,
}

struct WsListenerAdapter {
    state: Arc<ListenerState>,
}

impl WsListenerAdapter {
    fn new(path: String) -> WsListenerAdapter {
        WsListenerAdapter {
            state: Arc::new(ListenerState {
                path,
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
        let (mut tcp, remote) = match accepted {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        let local = tcp.local_addr().unwrap_or(remote);
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handshake::server_handshake(&mut tcp, &state.path).await {
                warn!(remote = %remote, error = %e, "websocket accept handshake failed");
                return;
            }
            let conn = WsConnection::new(CONN_IDS.next());
            let (read_half, write_half) = tcp.into_split();
            {
                let mut s = conn.state.lock().await;
                s.write_half = Some(write_half);
                s.remote = Some(remote.into());
                s.local = Some(local.into());
            }
            conn.connected.store(true, Ordering::SeqCst);
            trace!(id = %conn.id(), remote = %remote, "websocket accept");

            let callbacks = state.callbacks.lock().unwrap().clone();
            if callbacks.has_accept_callback() {
                callbacks.fire_accept_owned(Box::new(conn.clone()) as Box<dyn std::any::Any + Send>);
            } else {
                callbacks.fire_accept(conn.id());
            }
            conn.set_callbacks(
                ConnectionCallbacks::new()
                    .on_data({
                        let state = state.clone();
                        let id = conn.id().to_string();
                        move |data| state.callbacks.lock().unwrap().fire_data(&id, data)
                    })
                    .on_disconnected({
                        let state = state.clone();
                        let id = conn.id().to_string();
                        move || {
                            state.registry.remove(&id);
                            state.callbacks.lock().unwrap().fire_disconnect(&id);
                        }
                    }),
            );
            state
                .registry
                .insert(conn.id().to_string(), remote.to_string(), conn.clone());

            let this = conn.weak_self.upgrade().expect("connection outlives its own read loop");
            this.read_loop(read_half).await;
        });
    }
    state.listening.store(false, Ordering::SeqCst);
    state.stopped.notify_waiters();
}

impl Listener for WsListenerAdapter {
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.listening.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("websocket::listen"));
            }
            let addr_str = endpoint.to_string();
            let addr: SocketAddr = tokio::net::lookup_host(&addr_str)
                .await
                .map_err(|e| Error::new_io(e, "websocket::listen"))?
                .next()
                .ok_or_else(|| Error::invalid_argument().with_where("websocket::listen"))?;
            let listener = TokioTcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind_failed().with_where("websocket::bind").with_cause(e))?;
            let local = listener
                .local_addr()
                .map_err(|e| Error::new_io(e, "websocket::bind"))?;
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
                None => Err(Error::not_connected().with_where("websocket::send_to")),
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
                Err(Error::not_connected().with_where("websocket::broadcast"))
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
                None => Err(Error::not_connected().with_where("websocket::close_connection")),
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
