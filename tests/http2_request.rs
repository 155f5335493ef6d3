//! HTTP/2 GET request/response over a real TCP loopback socket (scenario
//! S4), driven directly through the [`netrt::http2::Engine`] API rather
//! than the `Transport` adapter (the adapter's `send` is a fixed unary
//! POST; this exercises headers/status/body end to end).

use bytes::Bytes;
use netrt::http2::Engine;
use tokio::net::{TcpListener, TcpStream};

#[tokio::test]
async fn http2_get_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let engine = Engine::handshake_server(stream).await.unwrap();
        let incoming = engine.accept_stream().await.unwrap();
        let method = incoming
            .headers
            .iter()
            .find(|(name, _)| name == ":method")
            .map(|(_, v)| v.clone());
        assert_eq!(method.as_deref(), Some("GET"));

        engine
            .send_headers(
                incoming.id,
                vec![
                    (":status".to_string(), "200".to_string()),
                    ("content-type".to_string(), "text/plain".to_string()),
                ],
                false,
            )
            .await
            .unwrap();
        engine.send_data(incoming.id, Bytes::from_static(b"ok"), true).await.unwrap();
    });

    let client_stream = TcpStream::connect(addr).await.unwrap();
    let engine = Engine::handshake_client(client_stream).await.unwrap();
    let response = engine
        .send_request(
            vec![
                (":method".to_string(), "GET".to_string()),
                (":scheme".to_string(), "https".to_string()),
                (":authority".to_string(), "example".to_string()),
                (":path".to_string(), "/".to_string()),
            ],
            Vec::new(),
            Bytes::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");
    assert!(response
        .headers
        .iter()
        .any(|(n, v)| n == "content-type" && v == "text/plain"));

    server.await.unwrap();
}
