//! Tests for the server runtime over loopback TCP.

use std::{net::TcpListener as StdTcpListener, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use rstest::rstest;
use tokio::{io::AsyncWriteExt, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;
use wiregate_testing::{connect, free_listener, read_stream_frame, read_to_close, stream_frame};

use crate::{
    codec::{ProtocolCodec, StreamCodec},
    config::ServiceConfig,
    connection::{ConnectionHandle, ConnectionHandler, DefaultHandler},
    server::{Server, ServerError},
};

struct Running {
    addr: std::net::SocketAddr,
    token: CancellationToken,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    async fn stop(self) {
        self.token.cancel();
        self.task
            .await
            .expect("join server task")
            .expect("server run failed");
    }
}

async fn start<H>(listener: StdTcpListener, config: ServiceConfig, handler: H) -> Running
where
    H: ConnectionHandler<StreamCodec>,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let server = Server::<StreamCodec, _>::from_std(config, listener, Arc::new(handler))
        .expect("adopt listener")
        .with_ready_signal(ready_tx);
    let addr = server.local_addr().expect("local addr");
    let token = CancellationToken::new();
    let task = tokio::spawn(server.run_until_cancelled(token.clone()));
    ready_rx.await.expect("server ready");
    Running { addr, token, task }
}

#[rstest]
#[tokio::test]
async fn serves_default_replies(free_listener: StdTcpListener) {
    let server = start(
        free_listener,
        ServiceConfig::default(),
        DefaultHandler::new("stream-service"),
    )
    .await;

    let mut client = connect(server.addr).await.expect("connect");
    client.write_all(&stream_frame(b"hello")).await.expect("write");
    let reply = read_stream_frame(&mut client).await.expect("reply");
    assert_eq!(reply, b"this is stream-service.");

    drop(client);
    server.stop().await;
}

#[rstest]
#[tokio::test]
async fn refuses_connections_over_the_limit(free_listener: StdTcpListener) {
    let server = start(
        free_listener,
        ServiceConfig::default().with_max_connections(1),
        DefaultHandler::new("svc"),
    )
    .await;

    let mut first = connect(server.addr).await.expect("connect");
    first.write_all(&stream_frame(b"x")).await.expect("write");
    read_stream_frame(&mut first).await.expect("first is served");

    let mut second = connect(server.addr).await.expect("connect");
    let leftover = read_to_close(&mut second).await.expect("closed by server");
    assert!(leftover.is_empty());

    drop(first);
    server.stop().await;
}

struct Explosive;

#[async_trait]
impl ConnectionHandler<StreamCodec> for Explosive {
    async fn on_request(&self, conn: &ConnectionHandle, message: Bytes) {
        assert!(message.as_ref() != b"boom", "boom");
        let _ = conn.send(StreamCodec::text_reply("ok"));
    }
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn connection_panics_are_logged_and_contained(free_listener: StdTcpListener) {
    let server = start(free_listener, ServiceConfig::default(), Explosive).await;

    let mut doomed = connect(server.addr).await.expect("connect");
    doomed.write_all(&stream_frame(b"boom")).await.expect("write");
    let _ = read_to_close(&mut doomed).await;

    let mut healthy = connect(server.addr).await.expect("connect");
    healthy.write_all(&stream_frame(b"hi")).await.expect("write");
    assert_eq!(read_stream_frame(&mut healthy).await.expect("reply"), b"ok");

    assert!(logs_contain("connection task panicked"));
    drop(healthy);
    server.stop().await;
}

#[tokio::test]
async fn bind_reports_the_address_in_use() {
    let taken = free_listener();
    let addr = taken.local_addr().expect("addr");
    let err = Server::<StreamCodec, _>::bind(
        ServiceConfig::new("dup", addr),
        Arc::new(DefaultHandler::new("dup")),
    )
    .await
    .err()
    .expect("address already bound");
    assert!(matches!(err, ServerError::Bind { addr: a, .. } if a == addr));
}
