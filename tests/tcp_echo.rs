//! TCP loopback echo (scenario S1): a listener echoes back whatever it
//! receives, and the client observes its own bytes reflected.

use netrt::{ConnectionCallbacks, Endpoint, ListenerCallbacks};
use tokio::sync::mpsc;

#[tokio::test]
async fn tcp_loopback_echo() {
    let listener = netrt::tcp::listen();
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

    assert_eq!(listener.connection_count(), 0);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = netrt::tcp::connect();
    client.set_callbacks(ConnectionCallbacks::new().on_data(move |data| {
        let _ = tx.send(data.to_vec());
    }));
    client.connect(local).await.unwrap();

    client.send(b"hello".to_vec()).await.unwrap();

    let echoed = rx.recv().await.expect("echo never arrived");
    assert_eq!(echoed, b"hello");

    client.close();
    client.wait_for_stop().await;
    listener.stop().await;
}
