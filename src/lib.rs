#![deny(missing_debug_implementations)]
#![cfg_attr(test, deny(rust_2018_idioms))]
#![cfg_attr(all(test, feature = "full"), deny(unreachable_pub))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # netrt
//!
//! `netrt` is a unified network runtime: one small set of abstract
//! transport, connection, and listener contracts ([`transport::Transport`],
//! [`transport::Connection`], [`transport::Listener`]), implemented over
//! TCP, TLS, UDP, WebSocket, HTTP/2, and gRPC. Application code binds to
//! the abstract contracts; protocol factories in [`io::tcp_connect`]/
//! [`udp`]/[`websocket`]/[`http2`] produce concrete instances sharing a
//! single asynchronous I/O engine ([`rt::Scheduler`]) and a common
//! thread-pool scheduler.
//!
//! ## Optional Features
//!
//! - `tcp`: plain TCP transport and listener.
//! - `tls`: TLS wrapping of TCP (`rustls`-backed), negotiated via ALPN.
//! - `udp`: UDP transport and per-sender virtual-connection listener.
//! - `websocket`: RFC 6455 WebSocket over TCP.
//! - `http2`: RFC 7540 + HPACK HTTP/2 engine and adapter.
//! - `grpc`: gRPC unary/streaming orchestration over the HTTP/2 engine.
//! - `runtime`: the process-wide [`rt::Scheduler`] (multi-thread tokio rt).
//!
//! [`quic`] rounds out the per-protocol factory surface but is not
//! implemented; its `connect`/`listen` always return an error (QUIC/HTTP-3
//! stream logic is out of scope for this crate).
//! - `client`/`server`: narrows which half of each adapter's factory
//!   surface is compiled (both enabled by `full`).
//!
//! [feature flags]: https://doc.rust-lang.org/cargo/reference/manifest.html#the-features-section

pub use crate::error::{Error, Result};

#[macro_use]
mod cfg;

#[macro_use]
mod trace;

mod callback;
mod endpoint;
mod error;
mod options;
mod registry;
pub mod transport;

pub use callback::{ConnectionCallbacks, ListenerCallbacks};
pub use endpoint::Endpoint;
pub use options::ConnectionOptions;
pub use transport::{Connection, Listener, Transport};

cfg_rt! {
    pub mod rt;
}

mod io;

pub mod quic;

cfg_tcp! {
    /// Plain TCP transport and listener (§4.2, C2/C4).
    pub mod tcp {
        pub use crate::io::{tcp_connect as connect, tcp_listen as listen};
    }
}

cfg_tls! {
    /// TLS-wrapped TCP, negotiated via ALPN (§4.2).
    pub mod tls {
        pub use crate::io::{
            tls_connect as connect, tls_listen as listen, TlsAcceptorConfig, TlsConnectorConfig,
        };
    }
}

cfg_udp! {
    pub mod udp;
}

cfg_websocket! {
    pub mod websocket;
}

cfg_http2! {
    pub mod http2;
}

cfg_grpc! {
    pub mod grpc;
}
