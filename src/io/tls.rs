//! TLS transport and listener: the same `Connection`/`Listener` contracts as
//! plain TCP, with a `rustls` handshake spliced in before the first byte is
//! handed to callbacks. ALPN is negotiated from the configured protocol list
//! (used by the HTTP/2 adapter to offer `"h2"`).

use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::callback::{ConnectionCallbacks, ListenerCallbacks};
use crate::endpoint::{Endpoint, IdGenerator};
use crate::error::{Error, Result};
use crate::options::ConnectionOptions;
use crate::registry::ConnectionRegistry;
use crate::transport::{BoxFuture, Connection, Listener, Transport};

static CONN_IDS: IdGenerator = IdGenerator::new("tls");

const READ_BUF_SIZE: usize = 64 * 1024;

/// Client-side TLS configuration: trust anchors and ALPN offer list.
#[derive(Clone, Default)]
pub struct TlsConnectorConfig {
    pub ca_cert_path: Option<PathBuf>,
    pub alpn_protocols: Vec<Vec<u8>>,
    pub server_name: Option<String>,
}

/// Server-side TLS configuration: certificate chain, private key, and ALPN.
#[derive(Clone, Default)]
pub struct TlsAcceptorConfig {
    pub cert_chain_path: PathBuf,
    pub private_key_path: PathBuf,
    pub alpn_protocols: Vec<Vec<u8>>,
}

fn build_client_config(cfg: &TlsConnectorConfig) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    if let Some(path) = &cfg.ca_cert_path {
        let file = std::fs::File::open(path).map_err(|e| Error::new_io(e, "tls::load_ca"))?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .map_err(|e| Error::new_io(e, "tls::load_ca"))?;
        for cert in certs {
            roots
                .add(&rustls::Certificate(cert))
                .map_err(|e| Error::handshake_failed().with_where("tls::load_ca").with_cause(e))?;
        }
    }
    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = cfg.alpn_protocols.clone();
    Ok(config)
}

fn build_server_config(cfg: &TlsAcceptorConfig) -> Result<ServerConfig> {
    let cert_file =
        std::fs::File::open(&cfg.cert_chain_path).map_err(|e| Error::new_io(e, "tls::load_cert"))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .map_err(|e| Error::new_io(e, "tls::load_cert"))?
        .into_iter()
        .map(rustls::Certificate)
        .collect::<Vec<_>>();

    let key_file =
        std::fs::File::open(&cfg.private_key_path).map_err(|e| Error::new_io(e, "tls::load_key"))?;
    let mut key_reader = BufReader::new(key_file);
    let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
        .map_err(|e| Error::new_io(e, "tls::load_key"))?
        .into_iter()
        .next()
        .ok_or_else(|| Error::handshake_failed().with_where("tls::load_key: no private key found"))?;

    let mut config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .map_err(|e| Error::handshake_failed().with_where("tls::build_server_config").with_cause(e))?;
    config.alpn_protocols = cfg.alpn_protocols.clone();
    Ok(config)
}

/// Create an unconnected TLS client connection.
pub fn connect(config: TlsConnectorConfig) -> Result<Arc<dyn Connection>> {
    let client_config = build_client_config(&config)?;
    Ok(TlsConnection::new(
        CONN_IDS.next(),
        TlsConnector::from(Arc::new(client_config)),
        config.server_name,
    ))
}

/// Create a TLS listener bound to `config`.
pub fn listen(config: TlsAcceptorConfig) -> Result<Arc<dyn Listener>> {
    let server_config = build_server_config(&config)?;
    Ok(Arc::new(TlsListenerAdapter::new(TlsAcceptor::from(Arc::new(
        server_config,
    )))))
}

type ClientStream = tokio_rustls::client::TlsStream<TcpStream>;
type ServerStream = tokio_rustls::server::TlsStream<TcpStream>;

struct State<S> {
    write_half: Option<WriteHalf<S>>,
    remote: Option<Endpoint>,
    local: Option<Endpoint>,
}

struct TlsConnection {
    id: String,
    weak_self: std::sync::Weak<TlsConnection>,
    connector: TlsConnector,
    server_name: Option<String>,
    state: AsyncMutex<State<ClientStream>>,
    connected: AtomicBool,
    connecting: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    options: std::sync::Mutex<ConnectionOptions>,
    stopped: Notify,
}

impl TlsConnection {
    fn new(id: String, connector: TlsConnector, server_name: Option<String>) -> Arc<TlsConnection> {
        Arc::new_cyclic(|weak| TlsConnection {
            id,
            weak_self: weak.clone(),
            connector,
            server_name,
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

    async fn do_connect(&self, endpoint: Endpoint) -> Result<()> {
        if endpoint.is_empty_host() {
            return Err(Error::invalid_argument().with_where("tls::connect: empty host"));
        }
        let addr = crate::io::resolve(&endpoint).await?;
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::new_io(e, "tls::connect"))?;
        let local = tcp
            .local_addr()
            .map_err(|e| Error::new_io(e, "tls::connect"))?;
        let name_str = self
            .server_name
            .clone()
            .unwrap_or_else(|| endpoint.host().to_string());
        let server_name = rustls::ServerName::try_from(name_str.as_str())
            .map_err(|_| Error::invalid_argument().with_where("tls::connect: invalid server name"))?;
        let tls_stream = self.connector.connect(server_name, tcp).await.map_err(|e| {
            warn!(id = %self.id, error = %e, "tls handshake failed");
            Error::handshake_failed().with_where("tls::connect").with_cause(e)
        })?;
        let (read_half, write_half) = tokio::io::split(tls_stream);
        {
            let mut state = self.state.lock().await;
            state.write_half = Some(write_half);
            state.remote = Some(addr.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        debug!(id = %self.id, remote = %addr, "tls handshake complete");
        let this = self.weak_self.upgrade().expect("connection outlives its own read loop");
        tokio::spawn(async move {
            this.read_loop(read_half).await;
        });
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut read_half: ReadHalf<ClientStream>) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => self.callbacks().fire_data(&buf[..n]),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "tls read failed");
                    self.callbacks().fire_error(&Error::new_io(e, "tls::read"));
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

impl Transport for TlsConnection {
    fn send(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state.write_half.as_mut() {
                Some(w) => w
                    .write_all(&data)
                    .await
                    .map_err(|e| Error::new_io(e, "tls::send")),
                None => Err(Error::not_connected().with_where("tls::send")),
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

impl Connection for TlsConnection {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected.load(Ordering::SeqCst) {
                return Err(Error::already_connected().with_where("tls::connect"));
            }
            if self.connecting.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("tls::connect"));
            }
            let result = self.do_connect(endpoint).await;
            self.connecting.store(false, Ordering::SeqCst);
            result
        })
    }

    fn connect_url(&self, _url: &str) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            Err(Error::invalid_argument().with_where("tls::connect_url: TLS has no URL form"))
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
    listening: AtomicBool,
    local: std::sync::Mutex<Option<Endpoint>>,
    callbacks: std::sync::Mutex<ListenerCallbacks>,
    registry: ConnectionRegistry<Arc<TlsServerConnection>>,
    stop: Notify,
    stopped: Notify,
}

struct TlsListenerAdapter {
    acceptor: TlsAcceptor,
    state: Arc<ListenerState>,
}

impl TlsListenerAdapter {
    fn new(acceptor: TlsAcceptor) -> TlsListenerAdapter {
        TlsListenerAdapter {
            acceptor,
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

/// An accepted TLS server-side connection. Distinct from [`TlsConnection`]
/// because `tokio_rustls`'s client and server stream types differ, and the
/// handshake for an accepted socket has already completed by the time the
/// session reaches the registry.
struct TlsServerConnection {
    id: String,
    weak_self: std::sync::Weak<TlsServerConnection>,
    state: AsyncMutex<State<ServerStream>>,
    connected: AtomicBool,
    callbacks: std::sync::Mutex<ConnectionCallbacks>,
    stopped: Notify,
}

impl TlsServerConnection {
    fn new(id: String) -> Arc<TlsServerConnection> {
        Arc::new_cyclic(|weak| TlsServerConnection {
            id,
            weak_self: weak.clone(),
            state: AsyncMutex::new(State {
                write_half: None,
                remote: None,
                local: None,
            }),
            connected: AtomicBool::new(false),
            callbacks: std::sync::Mutex::new(ConnectionCallbacks::new()),
            stopped: Notify::new(),
        })
    }

    fn callbacks(&self) -> ConnectionCallbacks {
        self.callbacks.lock().unwrap().clone()
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.write_half.as_mut() {
            Some(w) => w
                .write_all(data)
                .await
                .map_err(|e| Error::new_io(e, "tls::send_to")),
            None => Err(Error::not_connected().with_where("tls::send_to")),
        }
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.try_lock() {
            state.write_half = None;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.stopped.notify_waiters();
    }

    async fn adopt(&self, stream: ServerStream, remote: SocketAddr, local: SocketAddr) {
        let (read_half, write_half) = tokio::io::split(stream);
        {
            let mut state = self.state.lock().await;
            state.write_half = Some(write_half);
            state.remote = Some(remote.into());
            state.local = Some(local.into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.callbacks().fire_connected();
        let this = self.weak_self.upgrade().expect("connection outlives its own read loop");
        tokio::spawn(async move {
            this.read_loop(read_half).await;
        });
    }

    async fn read_loop(self: Arc<Self>, mut read_half: ReadHalf<ServerStream>) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => self.callbacks().fire_data(&buf[..n]),
                Err(e) => {
                    self.callbacks().fire_error(&Error::new_io(e, "tls::read"));
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

async fn accept_loop(state: Arc<ListenerState>, listener: TokioTcpListener, acceptor: TlsAcceptor) {
    loop {
        let accepted = tokio::select! {
            r = listener.accept() => r,
            _ = state.stop.notified() => break,
        };
        let (tcp, remote) = match accepted {
            Ok(pair) => pair,
            Err(e) if crate::io::is_connection_error(&e) => continue,
            Err(_) => {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        let local = tcp.local_addr().unwrap_or(remote);
        let acceptor = acceptor.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(tcp).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(remote = %remote, error = %e, "tls accept handshake failed");
                    return;
                }
            };
            let conn = TlsServerConnection::new(CONN_IDS.next());
            conn.adopt(tls_stream, remote, local).await;
            trace!(id = %conn.id(), remote = %remote, "tls accept");

            let callbacks = state.callbacks.lock().unwrap().clone();
            callbacks.fire_accept(conn.id());
            *conn.callbacks.lock().unwrap() = ConnectionCallbacks::new()
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
                });
            state
                .registry
                .insert(conn.id().to_string(), remote.to_string(), conn);
        });
    }
    state.listening.store(false, Ordering::SeqCst);
    state.stopped.notify_waiters();
}

impl Listener for TlsListenerAdapter {
    fn start(&self, endpoint: Endpoint) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.state.listening.swap(true, Ordering::SeqCst) {
                return Err(Error::already_running().with_where("tls::listen"));
            }
            let addr = crate::io::resolve(&endpoint).await?;
            let listener = TokioTcpListener::bind(addr)
                .await
                .map_err(|e| Error::bind_failed().with_where("tls::bind").with_cause(e))?;
            let local = listener
                .local_addr()
                .map_err(|e| Error::new_io(e, "tls::bind"))?;
            *self.state.local.lock().unwrap() = Some(local.into());
            let state = self.state.clone();
            tokio::spawn(accept_loop(state, listener, self.acceptor.clone()));
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
                Some(c) => c.send(&data).await,
                None => Err(Error::not_connected().with_where("tls::send_to")),
            }
        })
    }

    fn broadcast(&self, data: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        let snapshot = self.state.registry.snapshot();
        Box::pin(async move {
            let mut any_ok = false;
            for (_, conn) in snapshot {
                if conn.send(&data).await.is_ok() {
                    any_ok = true;
                }
            }
            if any_ok {
                Ok(())
            } else {
                Err(Error::not_connected().with_where("tls::broadcast"))
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
                None => Err(Error::not_connected().with_where("tls::close_connection")),
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
