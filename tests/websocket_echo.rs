//! WebSocket handshake + text-frame echo over loopback (scenario S3).

use netrt::{ConnectionCallbacks, Endpoint, ListenerCallbacks};
use tokio::sync::mpsc;

#[tokio::test]
async fn websocket_handshake_and_echo() {
    let listener = netrt::websocket::listen("/chat");
    let echo_target = listener.clone();
    listener.set_callbacks(ListenerCallbacks::new().on_data(move |id, data| {
        let listener = echo_target.clone();
        let id = id.to_string();
        let data = data.to_vec();
        tokio::spawn(async move {
            let _ = listener.send_to(&id, data).await;
        });
    }));
    listener.start(Endpoint::new("127.0.0.1", 0)).await.unwrap();
    let local = listener.local_endpoint().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = netrt::websocket::connect();
    client.set_callbacks(ConnectionCallbacks::new().on_data(move |data| {
        let _ = tx.send(data.to_vec());
    }));
    client
        .connect_url(&format!("ws://{}:{}/chat", local.host(), local.port()))
        .await
        .unwrap();

    client.send(b"hello websocket".to_vec()).await.unwrap();

    let echoed = rx.recv().await.expect("echo never arrived");
    assert_eq!(echoed, b"hello websocket");

    client.close();
    client.wait_for_stop().await;
    listener.stop().await;
}
