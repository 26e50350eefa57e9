//! One-shot client handlers used by `wiregate client`.
//!
//! Each handler sends a single message once the connection is usable, prints
//! the first reply to stdout and closes.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;
use wiregate::{
    ConnectionHandle,
    ConnectionHandler,
    Outbound,
    codec::{HttpCodec, HttpMessage, HttpRequest, StreamCodec, WebSocketCodec, WebSocketMessage},
};

/// Sends `message` and prints the first reply.
#[derive(Debug)]
pub struct OneShot {
    message: String,
}

impl OneShot {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn print_and_close(conn: &ConnectionHandle, reply: &str) {
        println!("{reply}");
        conn.close();
    }
}

#[async_trait]
impl ConnectionHandler<StreamCodec> for OneShot {
    async fn on_connect(&self, conn: &ConnectionHandle) {
        let _ = conn.send(Outbound::payload(self.message.clone()));
    }

    async fn on_request(&self, conn: &ConnectionHandle, message: Bytes) {
        Self::print_and_close(conn, &String::from_utf8_lossy(&message));
    }
}

#[async_trait]
impl ConnectionHandler<HttpCodec> for OneShot {
    async fn on_connect(&self, conn: &ConnectionHandle) {
        let _ = conn.send(HttpRequest::get(self.message.as_str()).into_outbound());
    }

    async fn on_request(&self, conn: &ConnectionHandle, message: HttpMessage) {
        info!(status = ?message.status(), "http response");
        Self::print_and_close(conn, &message.body_text());
    }
}

#[async_trait]
impl ConnectionHandler<WebSocketCodec> for OneShot {
    async fn on_request(&self, conn: &ConnectionHandle, message: WebSocketMessage) {
        match message {
            WebSocketMessage::Handshake(_) => {
                info!(peer = conn.remote_addr(), "websocket handshake complete");
                let _ = conn.send(Outbound::payload(self.message.clone()));
            }
            WebSocketMessage::Frame(frame) => Self::print_and_close(conn, &frame.text()),
        }
    }
}
