//! gRPC unary echo call over a real TCP loopback socket (scenario S6).

use std::sync::Arc;

use netrt::grpc::{Client, Handler, Server, ServerContext, Status};
use netrt::http2::Engine;
use netrt::transport::BoxFuture;
use tokio::net::{TcpListener, TcpStream};

fn echo_handler() -> Handler {
    Arc::new(|mut ctx: ServerContext| {
        Box::pin(async move {
            if let Ok(Some(payload)) = ctx.recv().await {
                let _ = ctx.send(&payload).await;
            }
            let _ = ctx.finish(Status::ok()).await;
        }) as BoxFuture<'static, ()>
    })
}

#[tokio::test]
async fn grpc_unary_echo_roundtrip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let engine = Engine::handshake_server(stream).await.unwrap();
        let mut server = Server::new(engine);
        server.register("/pkg.Svc/Echo", echo_handler());
        Arc::new(server).serve().await;
    });

    let client_stream = TcpStream::connect(addr).await.unwrap();
    let engine = Engine::handshake_client(client_stream).await.unwrap();
    let client = Client::new(engine, "example", false);

    let request = vec![0x01, 0x02, 0x03];
    let response = client
        .unary("/pkg.Svc/Echo", &request, None, Vec::new())
        .await
        .unwrap();

    assert_eq!(response.payload, request);
    assert_eq!(response.status.code, netrt::grpc::Code::Ok);

    server_task.abort();
}
