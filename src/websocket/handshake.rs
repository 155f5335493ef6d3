//! The RFC 6455 HTTP/1.1 upgrade handshake, client and server sides.

use base64::Engine as _;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub struct ParsedWsUrl {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

/// Parse a `ws://host[:port]/path` or `wss://host[:port]/path` URL.
pub fn parse_ws_url(url: &str) -> Result<ParsedWsUrl> {
    let (tls, rest) = if let Some(r) = url.strip_prefix("wss://") {
        (true, r)
    } else if let Some(r) = url.strip_prefix("ws://") {
        (false, r)
    } else {
        return Err(Error::invalid_argument().with_where("websocket::parse_url: missing ws[s]:// scheme"));
    };

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };
    if authority.is_empty() {
        return Err(Error::invalid_argument().with_where("websocket::parse_url: empty host"));
    }
    let default_port = if tls { 443 } else { 80 };
    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => (
            h.to_string(),
            p.parse::<u16>()
                .map_err(|_| Error::invalid_argument().with_where("websocket::parse_url: bad port"))?,
        ),
        None => (authority.to_string(), default_port),
    };

    Ok(ParsedWsUrl {
        tls,
        host,
        port,
        path: path.to_string(),
    })
}

fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Perform the client side of the handshake over an already-connected TCP
/// socket. `wss://` TLS wrapping happens before this call.
pub async fn client_handshake(stream: &mut TcpStream, target: &ParsedWsUrl) -> Result<()> {
    let mut key_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path = target.path,
        host = target.host,
        key = key,
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::new_io(e, "websocket::handshake"))?;

    let response = read_http_head(stream).await?;
    let expected_accept = accept_key(&key);
    let status_ok = response.lines().next().map_or(false, |l| l.contains("101"));
    let accept_ok = response
        .lines()
        .any(|l| header_value(l, "sec-websocket-accept").as_deref() == Some(expected_accept.as_str()));

    if !status_ok || !accept_ok {
        return Err(Error::handshake_failed().with_where("websocket::client_handshake"));
    }
    Ok(())
}

/// Perform the server side of the handshake, verifying the request targets
/// `expected_path`.
pub async fn server_handshake(stream: &mut TcpStream, expected_path: &str) -> Result<()> {
    let request = read_http_head(stream).await?;
    let bytes = request.into_bytes();

    let mut header_storage = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Request::new(&mut header_storage);
    parsed
        .parse(&bytes)
        .map_err(|_| Error::handshake_failed().with_where("websocket::server_handshake: malformed request"))?;

    if parsed.path != Some(expected_path) {
        return Err(Error::handshake_failed().with_where("websocket::server_handshake: path mismatch"));
    }
    let key = parsed
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|h| String::from_utf8_lossy(h.value).into_owned())
        .ok_or_else(|| Error::handshake_failed().with_where("websocket::server_handshake: missing key"))?;
    let accept = accept_key(&key);

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| Error::new_io(e, "websocket::server_handshake"))?;
    Ok(())
}

fn header_value(line: &str, name: &str) -> Option<String> {
    let (k, v) = line.split_once(':')?;
    if k.trim().eq_ignore_ascii_case(name) {
        Some(v.trim().to_string())
    } else {
        None
    }
}

async fn read_http_head(stream: &mut TcpStream) -> Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream
            .read_exact(&mut byte)
            .await
            .map_err(|e| Error::new_io(e, "websocket::handshake"))?;
        buf.push(byte[0]);
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            break;
        }
        if buf.len() > 16 * 1024 {
            return Err(Error::invalid_frame().with_where("websocket::handshake: head too large"));
        }
    }
    String::from_utf8(buf).map_err(|_| Error::handshake_failed().with_where("websocket::handshake: non-utf8 head"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn parse_ws_url_defaults_port_and_path() {
        let parsed = parse_ws_url("ws://example.com").unwrap();
        assert!(!parsed.tls);
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/");

        let parsed = parse_ws_url("wss://example.com:9443/chat").unwrap();
        assert!(parsed.tls);
        assert_eq!(parsed.port, 9443);
        assert_eq!(parsed.path, "/chat");
    }

    #[test]
    fn parse_ws_url_rejects_missing_scheme() {
        assert!(parse_ws_url("example.com/chat").is_err());
    }
}
