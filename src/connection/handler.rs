//! Application callbacks invoked by the connection driver.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ConnectionError, ConnectionHandle};
use crate::codec::ProtocolCodec;

/// Lifecycle callbacks for connections speaking protocol `C`.
///
/// One handler value is shared by every connection of a server, so any
/// per-connection state must be keyed by [`ConnectionHandle::id`] or by the
/// remote address.
#[async_trait]
pub trait ConnectionHandler<C: ProtocolCodec>: Send + Sync + 'static {
    /// Called once the connection is established and any connect-time bytes
    /// have been queued.
    async fn on_connect(&self, _conn: &ConnectionHandle) {}

    /// Called for every message the protocol layer delivers, in arrival order.
    async fn on_request(&self, conn: &ConnectionHandle, message: C::Message);

    /// Called exactly once after the connection closed, for any reason.
    async fn on_close(&self, _conn: &ConnectionHandle) {}

    /// Called before [`on_close`](Self::on_close) when the connection failed.
    async fn on_error(&self, conn: &ConnectionHandle, err: &ConnectionError) {
        warn!(
            peer = conn.remote_addr(),
            error = %err,
            kind = err.error_type(),
            "connection error"
        );
    }
}

/// Replies to every request with `this is <name>.`.
#[derive(Clone, Debug)]
pub struct DefaultHandler {
    name: String,
}

impl DefaultHandler {
    /// Create a handler announcing `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into() } }

    /// The announced name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Body of every reply.
    #[must_use]
    pub fn reply_text(&self) -> String { format!("this is {}.", self.name) }
}

#[async_trait]
impl<C: ProtocolCodec> ConnectionHandler<C> for DefaultHandler {
    async fn on_connect(&self, conn: &ConnectionHandle) {
        debug!(service = %self.name, peer = conn.remote_addr(), "connected");
    }

    async fn on_request(&self, conn: &ConnectionHandle, message: C::Message) {
        debug!(service = %self.name, peer = conn.remote_addr(), ?message, "request");
        if let Err(err) = conn.send(C::text_reply(&self.reply_text())) {
            debug!(service = %self.name, error = %err, "reply dropped");
        }
    }

    async fn on_close(&self, conn: &ConnectionHandle) {
        debug!(service = %self.name, peer = conn.remote_addr(), "closed");
    }
}
