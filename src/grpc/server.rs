//! The gRPC service registry and per-call server context (spec section
//! 4.10): incoming streams are routed by `:path` and handed to a
//! registered handler that reads/writes framed messages and finishes with
//! a [`Status`].

use std::collections::HashMap;
use std::sync::Arc;

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::http2::{Engine, IncomingStream, StreamEvent};
use crate::transport::BoxFuture;

use super::codec;
use super::status::Status;

/// A handler for one registered method. Receives a [`ServerContext`] it
/// drives to completion (reading zero or more requests, writing zero or
/// more responses, then finishing with a status) — unary, server-streaming,
/// client-streaming, and bidirectional calls are all the same shape from
/// the handler's point of view, they just read/write a different number of
/// messages.
pub type Handler = Arc<dyn Fn(ServerContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// One in-flight call's request/response plumbing.
pub struct ServerContext {
    engine: Arc<Engine>,
    incoming: IncomingStream,
    recv_buf: BytesMut,
    headers_sent: bool,
}

impl ServerContext {
    pub fn path(&self) -> Option<&str> {
        self.incoming
            .headers
            .iter()
            .find(|(n, _)| n == ":path")
            .map(|(_, v)| v.as_str())
    }

    pub fn metadata(&self) -> &[(String, String)] {
        &self.incoming.headers
    }

    /// Read the next request message, or `None` once the client half-closes.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some((_, payload)) = codec::decode(&mut self.recv_buf, codec::DEFAULT_MAX_MESSAGE_SIZE)? {
                return Ok(Some(payload.to_vec()));
            }
            match self.incoming.recv().await {
                Some(StreamEvent::Data(chunk)) => self.recv_buf.extend_from_slice(&chunk),
                Some(StreamEvent::Eof) | None => return Ok(None),
                Some(StreamEvent::Headers(_)) => continue,
                Some(StreamEvent::Reset(code)) => {
                    return Err(Error::closed()
                        .with_where("grpc::server: stream reset")
                        .with_cause(std::io::Error::new(std::io::ErrorKind::Other, format!("error code {code}"))))
                }
            }
        }
    }

    async fn ensure_headers_sent(&mut self) -> Result<()> {
        if !self.headers_sent {
            self.headers_sent = true;
            self.engine
                .send_headers(
                    self.incoming.id,
                    vec![
                        (":status".to_string(), "200".to_string()),
                        ("content-type".to_string(), "application/grpc".to_string()),
                    ],
                    false,
                )
                .await?;
        }
        Ok(())
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_headers_sent().await?;
        self.engine
            .send_data(self.incoming.id, codec::encode(payload, false), false)
            .await
    }

    /// Emit the trailing HEADERS block carrying `grpc-status`/`grpc-message`
    /// and close the stream.
    pub async fn finish(mut self, status: Status) -> Result<()> {
        self.ensure_headers_sent().await?;
        debug!(id = self.incoming.id, code = ?status.code, "grpc call finished");
        self.engine
            .send_headers(self.incoming.id, status.to_trailers(), true)
            .await
    }
}

/// Routes peer-initiated HTTP/2 streams to registered method handlers.
pub struct Server {
    engine: Arc<Engine>,
    handlers: HashMap<String, Handler>,
}

impl Server {
    pub fn new(engine: Arc<Engine>) -> Server {
        Server {
            engine,
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, path: impl Into<String>, handler: Handler) {
        self.handlers.insert(path.into(), handler);
    }

    /// Accept streams until the connection closes, dispatching each one to
    /// its registered handler on its own task. Unrecognized paths are
    /// answered with an `UNIMPLEMENTED` trailer immediately.
    pub async fn serve(self: Arc<Self>) {
        loop {
            let incoming = match self.engine.accept_stream().await {
                Some(incoming) => incoming,
                None => break,
            };
            let this = self.clone();
            tokio::spawn(async move { this.dispatch(incoming).await });
        }
    }

    async fn dispatch(&self, incoming: IncomingStream) {
        let handler = incoming
            .headers
            .iter()
            .find(|(n, _)| n == ":path")
            .and_then(|(_, v)| self.handlers.get(v.as_str()))
            .cloned();

        let ctx = ServerContext {
            engine: self.engine.clone(),
            incoming,
            recv_buf: BytesMut::new(),
            headers_sent: false,
        };

        match handler {
            Some(handler) => {
                trace!(path = ?ctx.path(), "grpc call dispatched");
                handler(ctx).await
            }
            None => {
                warn!(path = ?ctx.path(), "grpc call has no registered handler");
                let _ = ctx
                    .finish(Status::new(
                        super::status::Code::Unimplemented,
                        "no handler registered for this method",
                    ))
                    .await;
            }
        }
    }
}
