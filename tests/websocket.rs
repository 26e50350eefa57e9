//! WebSocket service tests over loopback TCP.

use std::{net::TcpListener as StdTcpListener, sync::{Arc, Mutex}};

use async_trait::async_trait;
use rstest::rstest;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use wiregate::{
    ConnectionHandle,
    ConnectionHandler,
    Outbound,
    client,
    codec::{WebSocketCodec, WebSocketMessage},
    config::ServiceConfig,
    connection::DefaultHandler,
    server::Server,
};
use wiregate_testing::{connect, free_listener, read_to_close};

/// Sends one text frame after the handshake and keeps the first reply.
#[derive(Default)]
struct Chat {
    replies: Mutex<Vec<String>>,
}

#[async_trait]
impl ConnectionHandler<WebSocketCodec> for Chat {
    async fn on_request(&self, conn: &ConnectionHandle, message: WebSocketMessage) {
        match message {
            WebSocketMessage::Handshake(_) => {
                conn.send(Outbound::payload("hello")).expect("send frame");
            }
            WebSocketMessage::Frame(frame) => {
                self.replies.lock().expect("lock").push(frame.text().into_owned());
                conn.close();
            }
        }
    }
}

async fn serve(listener: StdTcpListener, token: CancellationToken) -> std::net::SocketAddr {
    let server = Server::<WebSocketCodec, _>::from_std(
        ServiceConfig::default(),
        listener,
        Arc::new(DefaultHandler::new("ws")),
    )
    .expect("adopt listener");
    let addr = server.local_addr().expect("addr");
    tokio::spawn(server.run_until_cancelled(token));
    addr
}

#[rstest]
#[tokio::test]
async fn client_and_server_exchange_frames(free_listener: StdTcpListener) {
    let token = CancellationToken::new();
    let addr = serve(free_listener, token.clone()).await;

    let chat = Arc::new(Chat::default());
    let conn = client::connect(
        &ServiceConfig::new("ws-client", addr),
        WebSocketCodec::client(),
        Arc::clone(&chat),
        token.clone(),
    )
    .await
    .expect("dial");
    conn.join().await.expect("clean close");

    assert_eq!(*chat.replies.lock().expect("lock"), ["this is ws."]);
    token.cancel();
}

#[rstest]
#[tokio::test]
async fn raw_handshake_and_masked_frame(free_listener: StdTcpListener) {
    let token = CancellationToken::new();
    let addr = serve(free_listener, token.clone()).await;
    let mut sock = connect(addr).await.expect("connect");

    sock.write_all(
        b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
    )
    .await
    .expect("handshake");

    let mut response = Vec::new();
    while !response.ends_with(b"\r\n\r\n") {
        response.push(sock.read_u8().await.expect("handshake byte"));
    }
    let response = String::from_utf8(response).expect("utf8");
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

    let key = [1u8, 2, 3, 4];
    let mut frame = vec![0x81, 0x80 | 2];
    frame.extend_from_slice(&key);
    frame.extend(b"hi".iter().zip(key.iter().cycle()).map(|(b, k)| b ^ k));
    sock.write_all(&frame).await.expect("frame");

    let mut header = [0u8; 2];
    sock.read_exact(&mut header).await.expect("reply header");
    assert_eq!(header, [0x81, 11]);
    let mut body = [0u8; 11];
    sock.read_exact(&mut body).await.expect("reply body");
    assert_eq!(&body, b"this is ws.");

    sock.write_all(&[0x88, 0x80, 0, 0, 0, 0])
        .await
        .expect("close frame");
    assert!(read_to_close(&mut sock).await.expect("closed").is_empty());
    token.cancel();
}

#[rstest]
#[tokio::test]
async fn bad_upgrade_gets_400(free_listener: StdTcpListener) {
    let token = CancellationToken::new();
    let addr = serve(free_listener, token.clone()).await;
    let mut sock = connect(addr).await.expect("connect");

    sock.write_all(b"GET /chat HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .expect("request");
    let reply = String::from_utf8(read_to_close(&mut sock).await.expect("reply")).expect("utf8");
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{reply}");
    assert!(reply.contains("handshake err"));
    token.cancel();
}
