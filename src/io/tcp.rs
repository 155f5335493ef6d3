//! TCP transport and listener, grounded on the accept-loop shape of a
//! classic `AddrIncoming`: keepalive/nodelay applied per accepted socket,
//! transient `accept()` errors retried immediately, everything else
//! backed off with a one-second sleep.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::TcpKeepalive;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::{Endpoint, IdGenerator};
use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{BoxFuture, Connection, Listener, Transport};

static CONN_IDS: IdGenerator = IdGenerator::new("tcp");

const READ_BUF_SIZE: usize = 64 * 1024;

/// Create an unconnected TCP connection. Call [`Connection::connect`] to
/// dial out.
pub fn connect() -> Arc<dyn Connection> {
    TcpConnection::new(CONN_IDS.next())
}

/// Create a TCP listener. Call [`Listener::start`] to bind and begin
/// accepting.
pub fn listen() -> Arc<dyn Listener> {
    Arc::new(TcpListenerAdapter::new())
}

struct State {
    write_half: Option<OwnedWriteHalf>,
    remote: Option<Endpoint>,
    local: Option<Endpoint>,
}

struct TcpConnection {
    id: String,
    weak_self: std::sync::Weak<TcpConnection>,
    state: AsyncMutex<State>,
    connected: AtomicBool,
    connecting: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    options: std::sync::Mutex<ConnectionOptions>,
    stopped: Notify,
}

impl TcpConnection {
    fn new(id: String) -> Arc<TcpConnection> {
        Arc::new_cyclic(|weak| TcpConnection {
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

    async fn adopt(&self, stream: TcpStream, remote: SocketAddr, local: SocketAddr) {
        let opts = *self.options.lock().unwrap();
        if opts.no_delay {
            let _ = stream.set_nodelay(true);
        }
        if opts.keep_alive {
            let ka = TcpKeepalive::new().with_time(Duration::from_secs(60));
            let sock_ref = socket2::SockRef::from(&stream);
            let _ = sock_ref.set_tcp_keepalive(&ka);
        }
        let (read_half, write_half) = stream.into_split();
        {
            let mut state = self.state.lock().await;
            state.write_half = Some(write_half);
            state.remote = Some(remote.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        debug!(id = %self.id, remote = %remote, "tcp connection established");

        // `adopt` may run before the constructing `Arc` has been stored
        // anywhere else (the accepted-connection path spawns `adopt` itself),
        // so the read loop reaches its own `Arc` through `weak_self` rather
        // than requiring a `self: Arc<Self>` receiver everywhere above it.
        let this = self.weak_self.upgrade().expect("connection outlives its own read loop");
        tokio::spawn(async move {
            this.read_loop(read_half).await;
        });
    }

    async fn read_loop(self: Arc<Self>, mut read_half: tokio::net::tcp::OwnedReadHalf) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => self.callbacks().fire_data(&buf[..n]),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "tcp read failed");
                    self.callbacks().fire_error(&Error::new_io(e, "tcp::read"));
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

impl Transport for TcpConnection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.write_half.as_mut() {
                Some(w) => w
                    .write_all(&data)
                    .await
                    .map_err(|e| Error::new_io(e, "tcp::send")),
                None => Err(Error::not_connected().with_where("tcp::send")),
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

impl Connection for TcpConnection {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Err(Error::already_connected().with_where("tcp::connect"));
            }
            if self.connecting.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("tcp::connect"));
            }
            let result = self.do_connect(endpoint).await;
            self.connecting.store(false, Ordering::SeqCst);
            result
        })
    }

    fn connect_url(&self, _url: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            Err(Error::invalid_argument().with_where("tcp::connect_url: TCP has no URL form"))
        })
    }

    fn close(&self) {
        let this_state = &self.state;
        let connected = &self.connected;
        let stopped = &self.stopped;
        // Best-effort: drop the write half so in-flight writes fail fast;
        // the read loop observes EOF/reset and fires `on_disconnected`.
        if let Ok(mut state) = this_state.try_lock() {
            state.write_half = None;
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

impl TcpConnection {
    async fn do_connect(&self, endpoint: Endpoint) -> Result<()> {
        if endpoint.is_empty_host() {
            return Err(Error::invalid_argument().with_where("tcp::connect: empty host"));
        }
        let addr = crate::io::resolve(&endpoint).await?;
        let connect_timeout = self.options.lock().unwrap().connect_timeout;
        let stream = match connect_timeout {
            Some(d) => tokio::time::timeout(d, TcpStream::connect(addr))
                .await
                .map_err(|_| Error::connect_timeout().with_where("tcp::connect"))?
                .map_err(|e| Error::new_io(e, "tcp::connect"))?,
            None => TcpStream::connect(addr)
                .await
                .map_err(|e| Error::new_io(e, "tcp::connect"))?,
        };
        let local = stream
            .local_addr()
            .map_err(|e| Error::new_io(e, "tcp::connect"))?;
        self.adopt(stream, addr, local).await;
        Ok(())
    }
}

impl TcpConnection {
    fn from_accepted(stream: TcpStream, remote: SocketAddr, local: SocketAddr) -> Arc<TcpConnection> {
        let conn = TcpConnection::new(CONN_IDS.next());
        let c = conn.clone();
        tokio::spawn(async move {
            c.adopt(stream, remote, local).await;
        });
        conn
    }
}

struct ListenerState {
    listening: AtomicBool,
    local: std::sync::Mutex<Option<Endpoint>>,
    callbacks: std::sync::Mutex<ListenerCallbacks>,
    registry: ConnectionRegistry<Arc<TcpConnection>>,
    stop: Notify,
    stopped: Notify,
}

struct TcpListenerAdapter {
    state: Arc<ListenerState>,
}

impl TcpListenerAdapter {
    fn new() -> TcpListenerAdapter {
        TcpListenerAdapter {
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
    let mut backoff: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;
    loop {
        if let Some(sleep) = backoff.take() {
            tokio::select! {
                _ = sleep => {}
                _ = state.stop.notified() => break,
            }
        }
        let accepted = tokio::select! {
            r = listener.accept() => r,
            _ = state.stop.notified() => break,
        };
        match accepted {
            Ok((stream, remote)) => {
                let local = stream.local_addr().unwrap_or(remote);
                let conn = TcpConnection::from_accepted(stream, remote, local);
                trace!(remote = %remote, "tcp accept");
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
                        })
                        .on_error({
                            let state = state.clone();
                            let id = conn.id().to_string();
                            move |err| state.callbacks.lock().unwrap().fire_error(&id, err)
                        }),
                );
                state
                    .registry
                    .insert(conn.id().to_string(), remote.to_string(), conn);
            }
            Err(e) if crate::io::is_connection_error(&e) => continue,
            Err(_) => {
                backoff = Some(Box::pin(tokio::time::sleep(Duration::from_secs(1))));
            }
        }
    }
    state.listening.store(false, Ordering::SeqCst);
    state.stopped.notify_waiters();
}

impl Listener for TcpListenerAdapter {
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.listening.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("tcp::listen"));
            }
            let addr = crate::io::resolve(&endpoint).await?;
            let listener = TokioTcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind_failed().with_where("tcp::bind").with_cause(e))?;
            let local = listener
                .local_addr()
                .map_err(|e| Error::new_io(e, "tcp::bind"))?;
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

    fn set_accept_callback(
        &self,
        f: Arc<dyn Fn(Box<dyn std::any::Any + Send>) + Send + Sync>,
    ) {
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
                None => Err(Error::not_connected().with_where("tcp::send_to")),
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
                Err(Error::not_connected().with_where("tcp::broadcast"))
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
                None => Err(Error::not_connected().with_where("tcp::close_connection")),
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
