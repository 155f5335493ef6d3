//! GOAWAY shutdown (spec §4.7): once a peer's GOAWAY has been observed,
//! this engine refuses to allocate any new outbound stream.

use std::time::Duration;

use bytes::Bytes;
use netrt::http2::Engine;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn goaway_rejects_new_streams() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let engine = Engine::handshake_server(stream).await.unwrap();
        let incoming = engine.accept_stream().await.unwrap();
        engine
            .send_headers(incoming.id, vec![(":status".to_string(), "200".to_string())], false)
            .await
            .unwrap();
        engine.send_data(incoming.id, Bytes::from_static(b"ok"), true).await.unwrap();
        engine.close().await;
    });

    let client_stream = TcpStream::connect(addr).await.unwrap();
    let engine = Engine::handshake_client(client_stream).await.unwrap();

    let first = engine
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
    assert_eq!(first.status, 200);

    timeout(Duration::from_secs(5), async {
        while !engine.goaway_received() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("GOAWAY never observed");

    let second = engine
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
        .await;
    assert!(second.is_err());

    server.await.unwrap();
}
