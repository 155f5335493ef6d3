//! UDP datagram round-trip (scenario S2): the listener synthesizes a
//! virtual connection for the client's sender endpoint on first delivery,
//! then the client observes the listener's reply.

use netrt::{ConnectionCallbacks, Endpoint, ListenerCallbacks};
use tokio::sync::mpsc;

#[tokio::test]
async fn udp_datagram_roundtrip() {
    let listener = netrt::udp::listen();
    let (accept_tx, mut accept_rx) = mpsc::unbounded_channel();
    let echo_target = listener.clone();
    listener.set_callbacks(
        ListenerCallbacks::new()
            .on_accept(move |id| {
                let _ = accept_tx.send(id.to_string());
            })
            .on_data(move |id, data| {
                let listener = echo_target.clone();
                let id = id.to_string();
                let data = data.to_vec();
                tokio::spawn(async move {
                    let _ = listener.send_to(&id, data).await;
                });
            }),
    );
    listener.start(Endpoint::new("127.0.0.1", 0)).await.unwrap();
    let local = listener.local_endpoint().unwrap();

    let (data_tx, mut data_rx) = mpsc::unbounded_channel();
    let client = netrt::udp::connect();
    client.set_callbacks(ConnectionCallbacks::new().on_data(move |data| {
        let _ = data_tx.send(data.to_vec());
    }));
    client.connect(local).await.unwrap();
    client.send(b"ping".to_vec()).await.unwrap();

    let accepted_id = accept_rx.recv().await.expect("on_accept never fired");
    assert!(accepted_id.starts_with("127.0.0.1:"));
    assert_eq!(listener.connection_count(), 1);

    let reply = data_rx.recv().await.expect("reply never arrived");
    assert_eq!(reply, b"ping");

    client.close();
    listener.stop().await;
}
