//! Service providers attached to a gateway.
//!
//! A [`Provider`] is a stream-protocol client handler. When its connection to
//! the gateway's inner listener opens it announces its routes; afterwards it
//! answers heartbeat pings and dispatches every other request envelope to the
//! route handler registered for the envelope's `action`.

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{self, ClientConnection},
    codec::StreamCodec,
    config::ServiceConfig,
    connection::{ConnectionError, ConnectionHandle, ConnectionHandler},
    envelope::{
        ACTION_PING,
        ACTION_PONG,
        ACTION_REGISTER,
        Envelope,
        EnvelopeError,
        EnvelopeType,
        REGISTER_OK,
        RegisterProvider,
    },
};

pub mod user;

/// Computes the response `data` for one request envelope.
pub type RouteHandler = Arc<dyn Fn(&Envelope) -> Result<String, EnvelopeError> + Send + Sync>;

/// A named set of route handlers.
#[derive(Clone)]
pub struct Provider {
    name: String,
    routes: BTreeMap<String, RouteHandler>,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Provider {
    /// Create a provider with no routes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: BTreeMap::new(),
        }
    }

    /// Serve `action` with `handler`, replacing any earlier handler.
    #[must_use]
    pub fn route<F>(mut self, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Envelope) -> Result<String, EnvelopeError> + Send + Sync + 'static,
    {
        self.routes.insert(action.into(), Arc::new(handler));
        self
    }

    /// Provider name sent at registration.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Served routes in sorted order.
    #[must_use]
    pub fn route_names(&self) -> Vec<String> { self.routes.keys().cloned().collect() }

    /// Registration request announcing every route.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if the payload cannot be encoded.
    pub fn registration(&self) -> Result<Envelope, EnvelopeError> {
        let data = serde_json::to_string(&RegisterProvider {
            name: self.name.clone(),
            route: self.route_names(),
        })?;
        Ok(Envelope::request("", ACTION_REGISTER, data))
    }

    /// Answer one envelope from the gateway, if it needs an answer.
    ///
    /// Pings get a pong that echoes the ping's id. Requests for a served
    /// route get a response keeping the request's id and action. Anything
    /// else, including failed handlers, yields `None`.
    #[must_use]
    pub fn answer(&self, envelope: Envelope) -> Option<Envelope> {
        match envelope.kind {
            EnvelopeType::Request if envelope.action == ACTION_PING => {
                let id = envelope.id;
                Some(Envelope::response(id.clone(), ACTION_PONG, id))
            }
            EnvelopeType::Request => {
                let Some(handler) = self.routes.get(&envelope.action) else {
                    warn!(provider = %self.name, action = %envelope.action, "no handler for action");
                    return None;
                };
                match handler(&envelope) {
                    Ok(data) => Some(envelope.into_response(data)),
                    Err(err) => {
                        warn!(
                            provider = %self.name,
                            action = %envelope.action,
                            error = %err,
                            "route handler failed"
                        );
                        None
                    }
                }
            }
            EnvelopeType::Response if envelope.action == ACTION_REGISTER => {
                if envelope.data == REGISTER_OK {
                    info!(provider = %self.name, "registered with gateway");
                } else {
                    warn!(provider = %self.name, reply = %envelope.data, "registration refused");
                }
                None
            }
            EnvelopeType::Response => {
                debug!(provider = %self.name, action = %envelope.action, "ignoring response");
                None
            }
        }
    }
}

fn send_envelope(conn: &ConnectionHandle, envelope: &Envelope) {
    match envelope.to_outbound() {
        Ok(outbound) => {
            if let Err(err) = conn.send(outbound) {
                debug!(error = %err, "envelope dropped");
            }
        }
        Err(err) => warn!(error = %err, "failed to encode envelope"),
    }
}

#[async_trait]
impl ConnectionHandler<StreamCodec> for Provider {
    async fn on_connect(&self, conn: &ConnectionHandle) {
        match self.registration() {
            Ok(envelope) => send_envelope(conn, &envelope),
            Err(err) => warn!(provider = %self.name, error = %err, "failed to build registration"),
        }
    }

    async fn on_request(&self, conn: &ConnectionHandle, message: Bytes) {
        let envelope = match Envelope::from_slice(&message) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(provider = %self.name, error = %err, "dropping malformed envelope");
                return;
            }
        };
        if let Some(reply) = self.answer(envelope) {
            send_envelope(conn, &reply);
        }
    }

    async fn on_close(&self, conn: &ConnectionHandle) {
        info!(provider = %self.name, gateway = conn.remote_addr(), "gateway connection closed");
    }
}

/// Connect `provider` to the gateway at `config.address`.
///
/// # Errors
///
/// Returns [`ConnectionError::Io`] if the gateway cannot be reached.
pub async fn connect(
    provider: Arc<Provider>,
    config: &ServiceConfig,
    shutdown: CancellationToken,
) -> Result<ClientConnection, ConnectionError> {
    client::connect(config, StreamCodec::new(), provider, shutdown).await
}
