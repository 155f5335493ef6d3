//! gRPC (C10): unary and streaming RPC layered on the HTTP/2 engine.
//!
//! [`client::Client`] drives calls from `http2::Engine::send_request`/
//! `open_stream`; [`server::Server`] routes peer-initiated streams from
//! `http2::Engine::accept_stream` to handlers registered by `:path`. Both
//! share [`codec`] (length-prefixed message framing) and [`status`] (the
//! gRPC status enum, kept in its own numeric space from [`crate::error`]).

pub mod client;
pub mod codec;
pub mod metadata;
pub mod server;
pub mod status;

pub use client::{Call, Client, UnaryResponse};
pub use server::{Handler, Server, ServerContext};
pub use status::{Code, Status};
