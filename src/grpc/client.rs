//! Unary and streaming gRPC call orchestration over an [`Http2Engine`]
//! (spec section 4.10).

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::http2::{Engine as Http2Engine, StreamEvent};

use super::codec;
use super::metadata;
use super::status::{Code, Status};

/// A connected gRPC channel: one HTTP/2 connection plus the authority used
/// to build `:authority`/`:scheme` pseudo-headers for every call.
pub struct Client {
    engine: Arc<Http2Engine>,
    authority: String,
    scheme: &'static str,
}

/// The result of a unary call: either a response payload plus an OK
/// status, or a non-OK [`Status`].
pub struct UnaryResponse {
    pub payload: Vec<u8>,
    pub status: Status,
}

impl Client {
    pub fn new(engine: Arc<Http2Engine>, authority: impl Into<String>, tls: bool) -> Client {
        Client {
            engine,
            authority: authority.into(),
            scheme: if tls { "https" } else { "http" },
        }
    }

    fn base_headers(&self, deadline: Option<Instant>) -> Result<Vec<(String, String)>> {
        check_deadline(deadline)?;
        let mut headers = vec![
            ("content-type".to_string(), "application/grpc".to_string()),
            ("te".to_string(), "trailers".to_string()),
            (
                "grpc-accept-encoding".to_string(),
                "identity,gzip,deflate".to_string(),
            ),
        ];
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            headers.push(("grpc-timeout".to_string(), metadata::format_timeout(remaining)));
        }
        Ok(headers)
    }

    fn pseudo_headers(&self, path: &str) -> Vec<(String, String)> {
        vec![
            (":method".to_string(), "POST".to_string()),
            (":scheme".to_string(), self.scheme.to_string()),
            (":authority".to_string(), self.authority.clone()),
            (":path".to_string(), path.to_string()),
        ]
    }

    /// Unary call: `/pkg.Service/Method` with a single request message,
    /// returning a single response message and the trailing status.
    pub async fn unary(
        &self,
        path: &str,
        request: &[u8],
        deadline: Option<Instant>,
        extra_metadata: Vec<(String, String)>,
    ) -> Result<UnaryResponse> {
        let mut headers = self.base_headers(deadline)?;
        headers.extend(extra_metadata);
        let body = codec::encode(request, false);
        let response = self
            .engine
            .send_request(self.pseudo_headers(path), headers, body)
            .await?;

        if response.status != 200 {
            warn!(path = %path, http_status = response.status, "grpc unary call got non-200 response");
            return Ok(UnaryResponse {
                payload: Vec::new(),
                status: Status::new(Code::Unavailable, format!("http status {}", response.status)),
            });
        }

        let status = Status::from_trailers(&response.headers);
        trace!(path = %path, code = ?status.code, "grpc unary call finished");
        let mut buf = BytesMut::from(&response.body[..]);
        let payload = match codec::decode(&mut buf, codec::DEFAULT_MAX_MESSAGE_SIZE)? {
            Some((_, payload)) => payload.to_vec(),
            None => Vec::new(),
        };
        Ok(UnaryResponse { payload, status })
    }

    /// Open a client-streaming, server-streaming, or bidirectional call.
    /// The caller writes request messages via [`Call::send`] and reads
    /// response messages via [`Call::recv`].
    pub async fn streaming(
        &self,
        path: &str,
        deadline: Option<Instant>,
        extra_metadata: Vec<(String, String)>,
    ) -> Result<Call> {
        let mut headers = self.base_headers(deadline)?;
        headers.extend(extra_metadata);
        let handle = self.engine.open_stream(self.pseudo_headers(path), headers).await?;
        Ok(Call {
            handle,
            recv_buf: BytesMut::new(),
            trailers: None,
        })
    }
}

/// A streaming RPC in progress.
pub struct Call {
    handle: crate::http2::StreamHandle,
    recv_buf: BytesMut,
    trailers: Option<Vec<(String, String)>>,
}

impl Call {
    pub async fn send(&self, payload: &[u8], end_of_stream: bool) -> Result<()> {
        let framed = codec::encode(payload, false);
        self.handle.send_data(framed, end_of_stream).await
    }

    /// Read the next response message, or `None` once trailers arrive
    /// (call [`Call::status`] afterward).
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some((_, payload)) = codec::decode(&mut self.recv_buf, codec::DEFAULT_MAX_MESSAGE_SIZE)? {
                return Ok(Some(payload.to_vec()));
            }
            match self.handle.recv().await {
                Some(StreamEvent::Data(chunk)) => self.recv_buf.put_slice(&chunk),
                Some(StreamEvent::Headers(headers)) => self.trailers = Some(headers),
                Some(StreamEvent::Eof) | None => return Ok(None),
                Some(StreamEvent::Reset(code)) => {
                    return Err(Error::closed()
                        .with_where("grpc::client: stream reset")
                        .with_cause(std::io::Error::new(std::io::ErrorKind::Other, format!("error code {code}"))))
                }
            }
        }
    }

    pub fn status(&self) -> Status {
        match &self.trailers {
            Some(trailers) => Status::from_trailers(trailers),
            None => Status::ok(),
        }
    }

    pub async fn cancel(&self) {
        self.handle.reset().await;
    }
}

/// A deadline already in the past fails the call before any frames are
/// sent, per spec.md's gRPC timeout semantics.
fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(deadline) if deadline <= Instant::now() => {
            Err(status_error(Status::new(Code::DeadlineExceeded, "deadline already passed")))
        }
        _ => Ok(()),
    }
}

fn status_error(status: Status) -> Error {
    Error::invalid_argument()
        .with_where("grpc::client: rejected before sending")
        .with_cause(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} ({:?})", status.message, status.code),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn past_deadline_is_rejected_before_any_frame() {
        let deadline = Instant::now() - Duration::from_secs(1);
        assert!(check_deadline(Some(deadline)).is_err());
    }

    #[test]
    fn no_deadline_always_passes() {
        assert!(check_deadline(None).is_ok());
    }
}
