//! Outbound connections.
//!
//! [`connect`] dials a service and runs the same connection driver servers
//! use, so the client side gets identical framing, handler callbacks and
//! close semantics. Connect-time codec output (the WebSocket upgrade
//! request) is written before the handler's `on_connect` runs.

use std::{io, sync::Arc};

use log::info;
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::ProtocolCodec,
    config::ServiceConfig,
    connection::{Connection, ConnectionError, ConnectionHandle, ConnectionHandler},
};

/// A dialed connection running on its own task.
#[derive(Debug)]
pub struct ClientConnection {
    handle: ConnectionHandle,
    task: JoinHandle<Result<(), ConnectionError>>,
}

impl ClientConnection {
    /// Handle for writing to or closing the connection.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle { &self.handle }

    /// Wait for the connection to end.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection, or an I/O error if the
    /// connection task panicked or was aborted.
    pub async fn join(self) -> Result<(), ConnectionError> {
        self.task
            .await
            .map_err(|e| ConnectionError::Io(io::Error::other(e)))?
    }
}

/// Dial `config.address` and start driving the connection with `handler`.
///
/// # Errors
///
/// Returns [`ConnectionError::Io`] if the TCP connect fails.
pub async fn connect<C, H>(
    config: &ServiceConfig,
    codec: C,
    handler: Arc<H>,
    shutdown: CancellationToken,
) -> Result<ClientConnection, ConnectionError>
where
    C: ProtocolCodec,
    H: ConnectionHandler<C>,
{
    let stream = TcpStream::connect(config.address).await?;
    let peer = stream.peer_addr()?.to_string();
    info!(
        "client connected: name={}, protocol={}, peer_addr={peer}",
        config.name,
        C::KIND
    );

    let conn = Connection::new(stream, &peer, codec, config.max_frame_length);
    let handle = conn.handle();
    let task = tokio::spawn(async move { conn.run(&*handler, shutdown).await });
    Ok(ClientConnection { handle, task })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use wiregate_testing::stream_frame;

    use super::*;
    use crate::codec::{Outbound, StreamCodec};

    #[derive(Default)]
    struct Collect(Mutex<Vec<Bytes>>);

    #[async_trait]
    impl ConnectionHandler<StreamCodec> for Collect {
        async fn on_connect(&self, conn: &ConnectionHandle) {
            let _ = conn.send(Outbound::payload("hello"));
        }

        async fn on_request(&self, conn: &ConnectionHandle, message: Bytes) {
            self.0.lock().expect("lock").push(message);
            conn.close();
        }
    }

    #[tokio::test]
    async fn client_sends_on_connect_and_receives_replies() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let config = ServiceConfig::new("client", listener.local_addr().expect("addr"));
        let peer = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.expect("accept");
            let mut wire = [0u8; 9];
            sock.read_exact(&mut wire).await.expect("read");
            sock.write_all(&stream_frame(b"welcome")).await.expect("write");
            wire
        });

        let handler = Arc::new(Collect::default());
        let client = connect(
            &config,
            StreamCodec::new(),
            Arc::clone(&handler),
            CancellationToken::new(),
        )
        .await
        .expect("connect");
        client.join().await.expect("clean close");

        assert_eq!(&peer.await.expect("join"), b"\0\0\0\x05hello");
        assert_eq!(
            *handler.0.lock().expect("lock"),
            vec![Bytes::from_static(b"welcome")]
        );
    }

    #[tokio::test]
    async fn refused_dial_is_an_io_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = connect(
            &ServiceConfig::new("client", addr),
            StreamCodec::new(),
            Arc::new(Collect::default()),
            CancellationToken::new(),
        )
        .await
        .expect_err("nothing listening");
        assert!(matches!(err, ConnectionError::Io(_)));
    }
}
