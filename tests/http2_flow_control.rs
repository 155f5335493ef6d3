//! Flow-controlled large transfer (scenario S5): a request body bigger than
//! the initial per-stream/connection window must stall and resume via
//! WINDOW_UPDATE rather than fail outright.

use std::time::Duration;

use bytes::Bytes;
use netrt::http2::{Engine, StreamEvent};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

#[tokio::test]
async fn large_body_stalls_and_resumes_on_window_update() {
    const BODY_LEN: usize = 200_000; // bigger than the 65535-byte initial window

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let engine = Engine::handshake_server(stream).await.unwrap();
        let mut incoming = engine.accept_stream().await.unwrap();
        let mut received = 0usize;
        loop {
            match incoming.recv().await {
                Some(StreamEvent::Data(chunk)) => received += chunk.len(),
                Some(StreamEvent::Eof) => break,
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(received, BODY_LEN);
        engine
            .send_headers(incoming.id, vec![(":status".to_string(), "200".to_string())], false)
            .await
            .unwrap();
        engine.send_data(incoming.id, Bytes::from_static(b"ok"), true).await.unwrap();
    });

    let client_stream = TcpStream::connect(addr).await.unwrap();
    let engine = Engine::handshake_client(client_stream).await.unwrap();
    let body = Bytes::from(vec![0x42u8; BODY_LEN]);

    let response = timeout(
        Duration::from_secs(10),
        engine.send_request(
            vec![
                (":method".to_string(), "POST".to_string()),
                (":scheme".to_string(), "https".to_string()),
                (":authority".to_string(), "example".to_string()),
                (":path".to_string(), "/".to_string()),
            ],
            Vec::new(),
            body,
        ),
    )
    .await
    .expect("request stalled forever instead of resuming on WINDOW_UPDATE")
    .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");

    server.await.unwrap();
}
