//! UDP transport and listener (C2, C4). A UDP "connection" has no
//! handshake: the client adapter maps the unified `Connection` contract
//! onto *running with a target endpoint set* via `UdpSocket::connect`,
//! and the listener synthesizes one virtual connection per sender
//! endpoint the first time it is observed, exactly as a TCP listener
//! synthesizes one per accepted socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::{Endpoint, IdGenerator};
use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{BoxFuture, Connection, Listener, Transport};

static CONN_IDS: IdGenerator = IdGenerator::new("udp");

/// The largest single UDP datagram this crate reads (RFC 791 IPv4 max).
const MAX_DATAGRAM: usize = 65536;

/// Create an unconnected UDP connection. Call [`Connection::connect`] to
/// bind and set the target endpoint.
pub fn connect() -> Arc<dyn Connection> {
    UdpConnection::new(CONN_IDS.next())
}

/// Create a UDP listener. Call [`Listener::start`] to bind and begin
/// synthesizing per-sender virtual connections.
pub fn listen() -> Arc<dyn Listener> {
    Arc::new(UdpListenerAdapter::new())
}

struct State {
    socket: Option<Arc<UdpSocket>>,
    remote: Option<Endpoint>,
    local: Option<Endpoint>,
}

struct UdpConnection {
    id: String,
    weak_self: std::sync::Weak<UdpConnection>,
    state: AsyncMutex<State>,
    connected: AtomicBool,
    connecting: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    options: std::sync::Mutex<ConnectionOptions>,
    stopped: Notify,
}

impl UdpConnection {
    fn new(id: String) -> Arc<UdpConnection> {
        Arc::new_cyclic(|weak| UdpConnection {
            id,
            weak_self: weak.clone(),
            state: AsyncMutex::new(State {
                socket: None,
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

    async fn do_connect(&self, endpoint: Endpoint) -> Result<()> {
        if endpoint.is_empty_host() {
            return Err(Error::invalid_argument().with_where("udp::connect: empty host"));
        }
        let addr = crate::io::resolve(&endpoint).await?;
        let bind_addr: SocketAddr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| Error::new_io(e, "udp::connect"))?;
        socket.connect(addr).await.map_err(|e| Error::new_io(e, "udp::connect"))?;
        let local = socket.local_addr().map_err(|e| Error::new_io(e, "udp::connect"))?;
        let socket = Arc::new(socket);
        {
            let mut state = self.state.lock().await;
            state.socket = Some(socket.clone());
            state.remote = Some(addr.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        debug!(id = %self.id, remote = %addr, "udp socket connected");

        let this = self.weak_self.upgrade().expect("connection outlives its own read loop");
        tokio::spawn(async move {
            this.read_loop(socket).await;
        });
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            if !self.connected.load(Ordering::SeqCst) {
                break;
            }
            match socket.recv(&mut buf).await {
                Ok(n) => self.callbacks().fire_data(&buf[..n]),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "udp read failed");
                    self.callbacks().fire_error(&Error::new_io(e, "udp::read"));
                    break;
                }
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        self.callbacks().fire_disconnected();
        self.stopped.notify_waiters();
    }
}

impl Transport for UdpConnection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            match state.socket.as_ref() {
                Some(s) => s.send(&data).await.map(|_| ()).map_err(|e| Error::new_io(e, "udp::send")),
                None => Err(Error::not_connected().with_where("udp::send")),
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

impl Connection for UdpConnection {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Err(Error::already_connected().with_where("udp::connect"));
            }
            if self.connecting.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("udp::connect"));
            }
            let result = self.do_connect(endpoint).await;
            self.connecting.store(false, Ordering::SeqCst);
            result
        })
    }

    fn connect_url(&self, _url: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Err(Error::invalid_argument().with_where("udp::connect_url: UDP has no URL form")) })
    }

    fn close(&self) {
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

/// One sender endpoint observed by a [`UdpListenerAdapter`]: shares the
/// listener's bound socket and targets datagrams at `remote` only.
struct UdpVirtualConnection {
    id: String,
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    local: Endpoint,
}

impl Transport for UdpVirtualConnection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.socket
                .send_to(&data, self.remote)
                .await
                .map(|_| ())
                .map_err(|e| Error::new_io(e, "udp::send_to"))
        })
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn remote_endpoint(&self) -> Option<Endpoint> {
        Some(self.remote.into())
    }

    fn local_endpoint(&self) -> Option<Endpoint> {
        Some(self.local.clone())
    }
}

struct ListenerState {
    listening: AtomicBool,
    local: std::sync::Mutex<Option<Endpoint>>,
    callbacks: std::sync::Mutex<ListenerCallbacks>,
    registry: ConnectionRegistry<Arc<UdpVirtualConnection>>,
    stop: Notify,
    stopped: Notify,
}

struct UdpListenerAdapter {
    state: Arc<ListenerState>,
}

impl UdpListenerAdapter {
    fn new() -> UdpListenerAdapter {
        UdpListenerAdapter {
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

async fn recv_loop(state: Arc<ListenerState>, socket: Arc<UdpSocket>, local: Endpoint) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            r = socket.recv_from(&mut buf) => r,
            _ = state.stop.notified() => break,
        };
        match received {
            Ok((n, remote)) => {
                let id = remote.to_string();
                let is_new = state.registry.get(&id).is_none();
                if is_new {
                    let conn = Arc::new(UdpVirtualConnection {
                        id: id.clone(),
                        socket: socket.clone(),
                        remote,
                        local: local.clone(),
                    });
                    state.registry.insert(id.clone(), id.clone(), conn);
                    trace!(id = %id, "udp new sender endpoint observed");
                    state.callbacks.lock().unwrap().fire_accept(&id);
                }
                state.callbacks.lock().unwrap().fire_data(&id, &buf[..n]);
            }
            Err(e) if crate::io::is_connection_error(&e) => continue,
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    for (id, _) in state.registry.snapshot() {
        state.registry.remove(&id);
        debug!(id = %id, "udp virtual connection disconnected");
        state.callbacks.lock().unwrap().fire_disconnect(&id);
    }
    state.listening.store(false, Ordering::SeqCst);
    state.stopped.notify_waiters();
}

impl Listener for UdpListenerAdapter {
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.listening.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("udp::listen"));
            }
            let addr = crate::io::resolve(&endpoint).await?;
            let socket = UdpSocket::bind(addr)
                .await
                .map_err(|e| Error::bind_failed().with_where("udp::bind").with_cause(e))?;
            let local: Endpoint = socket.local_addr().map_err(|e| Error::new_io(e, "udp::bind"))?.into();
            *self.state.local.lock().unwrap() = Some(local.clone());
            let state = self.state.clone();
            tokio::spawn(recv_loop(state, Arc::new(socket), local));
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
                None => Err(Error::not_connected().with_where("udp::send_to")),
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
                Err(Error::not_connected().with_where("udp::broadcast"))
            }
        })
    }

    fn close_connection(&self, id: &str) -> BoxFuture<'_, Result<()>> {
        let conn = self.state.registry.remove(id);
        Box::pin(async move {
            match conn {
                Some(_) => Ok(()),
                None => Err(Error::not_connected().with_where("udp::close_connection")),
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
