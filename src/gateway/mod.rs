//! API gateway relaying external HTTP requests to registered providers.
//!
//! The gateway listens twice: providers connect to the inner listener using
//! the stream protocol and exchange JSON [`Envelope`]s, while external
//! clients connect to the open listener using HTTP. An external request for
//! path `p` is forwarded to a provider registered for route `p`, chosen
//! round-robin, and the provider's response is written back to the waiting
//! external connection, which is then closed.
//!
//! All shared state lives in one [`Gateway`] value passed to both handlers;
//! nothing is global, so several gateways can run in one process.

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    codec::{HttpCodec, HttpMessage, HttpResponse, StatusCode, StreamCodec},
    config::GatewayConfig,
    connection::{ConnectionError, ConnectionHandle, ConnectionHandler},
    envelope::{
        ACTION_PONG,
        ACTION_REGISTER,
        Envelope,
        EnvelopeError,
        EnvelopeType,
        REGISTER_OK,
        RegisterProvider,
    },
    metrics,
    server::{Server, ServerError},
};

mod heartbeat;
mod registry;

pub use heartbeat::run_heartbeat;
pub use registry::Registry;

/// Body returned to external clients when no provider serves the path.
pub const ROUTE_NOT_FOUND_BODY: &str = "api not found.";
/// Body returned when the chosen provider could not be reached.
pub const PROVIDER_UNAVAILABLE_BODY: &str = "provider unavailable.";

/// Errors raised by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No provider is registered for the route.
    #[error("no provider registered for route {0:?}")]
    RouteNotFound(String),

    /// A provider's registration request was unusable.
    #[error("registration rejected: {0}")]
    Registration(String),

    /// An envelope could not be encoded or decoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Writing to a provider or external connection failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A listener failed.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Shared gateway state.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    registry: Registry,
}

impl Gateway {
    /// Create a gateway with empty tables.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
        }
    }

    /// Gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig { &self.config }

    /// Route table and correlation state.
    #[must_use]
    pub fn registry(&self) -> &Registry { &self.registry }

    /// Register `provider` for the routes named in `envelope.data`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Registration`] if the data is not a
    /// registration payload or names no routes.
    pub fn register(
        &self,
        provider: &ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<RegisterProvider, GatewayError> {
        let request: RegisterProvider = envelope
            .parse_data()
            .map_err(|e| GatewayError::Registration(e.to_string()))?;
        if request.route.is_empty() {
            return Err(GatewayError::Registration("no routes offered".to_owned()));
        }
        self.registry.register(provider, &request.route);
        metrics::set_providers(self.registry.provider_count());
        info!(
            provider = %request.name,
            peer = provider.remote_addr(),
            routes = ?request.route,
            "provider registered"
        );
        Ok(request)
    }

    /// Forward an external request to a provider for its path.
    ///
    /// The external connection is stored under its remote address, which
    /// becomes the envelope's correlation id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RouteNotFound`] when no provider serves the
    /// path, or [`GatewayError::Connection`] when the chosen provider has
    /// already gone away.
    pub fn forward(&self, external: &ConnectionHandle, request: &HttpMessage) -> Result<(), GatewayError> {
        let route = request.path().unwrap_or_default();
        let provider = self
            .registry
            .dispatch(route)
            .ok_or_else(|| GatewayError::RouteNotFound(route.to_owned()))?;

        let id = external.remote_addr().to_owned();
        let envelope = Envelope::request(id.as_str(), route, query_data(request));
        let outbound = envelope.to_outbound()?;
        self.registry.track_open(id.as_str(), external.clone());
        if let Err(err) = provider.send(outbound) {
            let _ = self.registry.take_open(&id);
            return Err(err.into());
        }
        metrics::inc_dispatched();
        debug!(
            route,
            id = %id,
            provider = provider.remote_addr(),
            "request forwarded"
        );
        Ok(())
    }

    /// Deliver a provider response to the external connection waiting on its
    /// id. Returns `false` when nobody is waiting, which is not an error.
    pub fn correlate(&self, response: &Envelope) -> bool {
        let Some(external) = self.registry.take_open(&response.id) else {
            debug!(id = %response.id, "no connection waiting for response");
            return false;
        };
        let reply = HttpResponse::new(StatusCode::Ok).into_outbound(&response.data);
        if let Err(err) = external.send(reply) {
            debug!(id = %response.id, error = %err, "external connection already closed");
        }
        external.close();
        true
    }

    /// Handle one envelope received from a provider.
    pub fn handle_inner(&self, provider: &ConnectionHandle, envelope: Envelope) {
        match envelope.kind {
            EnvelopeType::Request if envelope.action == ACTION_REGISTER => {
                self.handle_registration(provider, envelope);
            }
            EnvelopeType::Request => {
                debug!(action = %envelope.action, "ignoring provider request");
            }
            EnvelopeType::Response if envelope.action == ACTION_PONG => {
                debug!(peer = provider.remote_addr(), data = %envelope.data, "pong");
            }
            EnvelopeType::Response => {
                self.correlate(&envelope);
            }
        }
    }

    fn handle_registration(&self, provider: &ConnectionHandle, envelope: Envelope) {
        let (reply, accepted) = match self.register(provider, &envelope) {
            Ok(_) => (envelope.into_response(REGISTER_OK), true),
            Err(err) => {
                warn!(peer = provider.remote_addr(), error = %err, "registration failed");
                (envelope.into_response(format!("registration err: {err}")), false)
            }
        };
        match reply.to_outbound() {
            Ok(outbound) => {
                let _ = provider.send(outbound);
            }
            Err(err) => warn!(error = %err, "failed to encode registration reply"),
        }
        if !accepted {
            provider.close();
        }
    }

    /// Handle one external HTTP request.
    pub fn handle_open(&self, external: &ConnectionHandle, request: &HttpMessage) {
        let (status, body) = match self.forward(external, request) {
            Ok(()) => return,
            Err(GatewayError::RouteNotFound(route)) => {
                metrics::inc_route_misses();
                info!(route = %route, peer = external.remote_addr(), "route not found");
                (StatusCode::BadRequest, ROUTE_NOT_FOUND_BODY)
            }
            Err(err) => {
                warn!(peer = external.remote_addr(), error = %err, "forwarding failed");
                (StatusCode::InternalServerError, PROVIDER_UNAVAILABLE_BODY)
            }
        };
        let _ = external.send(HttpResponse::new(status).into_outbound(body));
        external.close();
    }
}

/// Query parameters as a JSON object; integer values become JSON numbers.
fn query_data(request: &HttpMessage) -> String {
    let object: Map<String, Value> = request
        .query
        .iter()
        .map(|(key, value)| {
            let value = value
                .parse::<u64>()
                .map(Value::from)
                .or_else(|_| value.parse::<i64>().map(Value::from))
                .unwrap_or_else(|_| Value::String(value.clone()));
            (key.clone(), value)
        })
        .collect();
    Value::Object(object).to_string()
}

/// Handler for the provider-facing listener.
#[derive(Clone, Debug)]
pub struct InnerHandler(Arc<Gateway>);

impl InnerHandler {
    /// Serve provider connections for `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self { Self(gateway) }
}

#[async_trait]
impl ConnectionHandler<StreamCodec> for InnerHandler {
    async fn on_request(&self, conn: &ConnectionHandle, message: Bytes) {
        match Envelope::from_slice(&message) {
            Ok(envelope) => self.0.handle_inner(conn, envelope),
            Err(err) => warn!(peer = conn.remote_addr(), error = %err, "dropping malformed envelope"),
        }
    }

    async fn on_close(&self, conn: &ConnectionHandle) {
        let removed = self.0.registry().deregister(conn);
        metrics::set_providers(self.0.registry().provider_count());
        if removed > 0 {
            info!(peer = conn.remote_addr(), routes = removed, "provider deregistered");
        }
    }
}

/// Handler for the external HTTP listener.
#[derive(Clone, Debug)]
pub struct OpenHandler(Arc<Gateway>);

impl OpenHandler {
    /// Serve external connections for `gateway`.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self { Self(gateway) }
}

#[async_trait]
impl ConnectionHandler<HttpCodec> for OpenHandler {
    async fn on_request(&self, conn: &ConnectionHandle, message: HttpMessage) {
        self.0.handle_open(conn, &message);
    }

    async fn on_close(&self, conn: &ConnectionHandle) { self.0.registry().forget_open(conn); }
}

/// A gateway whose two listeners are bound.
pub struct BoundGateway {
    gateway: Arc<Gateway>,
    inner: Server<StreamCodec, InnerHandler>,
    open: Server<HttpCodec, OpenHandler>,
}

impl Gateway {
    /// Bind both listeners at the configured addresses.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Server`] if either address cannot be bound.
    pub async fn bind(self) -> Result<BoundGateway, GatewayError> {
        let gateway = Arc::new(self);
        let inner = Server::bind(
            gateway.config.inner.clone(),
            Arc::new(InnerHandler::new(Arc::clone(&gateway))),
        )
        .await?;
        let open = Server::bind(
            gateway.config.open.clone(),
            Arc::new(OpenHandler::new(Arc::clone(&gateway))),
        )
        .await?;
        Ok(BoundGateway {
            gateway,
            inner,
            open,
        })
    }

    /// Serve on already bound standard listeners.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Server`] if a listener cannot be adopted.
    pub fn from_std(
        self,
        inner: StdTcpListener,
        open: StdTcpListener,
    ) -> Result<BoundGateway, GatewayError> {
        let gateway = Arc::new(self);
        let inner = Server::from_std(
            gateway.config.inner.clone(),
            inner,
            Arc::new(InnerHandler::new(Arc::clone(&gateway))),
        )?;
        let open = Server::from_std(
            gateway.config.open.clone(),
            open,
            Arc::new(OpenHandler::new(Arc::clone(&gateway))),
        )?;
        Ok(BoundGateway {
            gateway,
            inner,
            open,
        })
    }
}

impl BoundGateway {
    /// Shared state, for inspection.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> { &self.gateway }

    /// Provider-facing address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Server`] if the socket cannot report it.
    pub fn inner_addr(&self) -> Result<SocketAddr, GatewayError> { Ok(self.inner.local_addr()?) }

    /// External-facing address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Server`] if the socket cannot report it.
    pub fn open_addr(&self) -> Result<SocketAddr, GatewayError> { Ok(self.open.local_addr()?) }

    /// Run both listeners and the heartbeat until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the first listener error.
    pub async fn run_until_cancelled(self, token: CancellationToken) -> Result<(), GatewayError> {
        let BoundGateway {
            gateway,
            inner,
            open,
        } = self;
        let heartbeat = tokio::spawn(run_heartbeat(
            Arc::clone(&gateway),
            gateway.config.heartbeat_interval,
            token.clone(),
        ));
        let served = tokio::try_join!(
            inner.run_until_cancelled(token.clone()),
            open.run_until_cancelled(token.clone()),
        );
        token.cancel();
        if let Err(err) = heartbeat.await {
            warn!(error = %err, "heartbeat task failed");
        }
        served?;
        Ok(())
    }

    /// Run until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns the first listener error.
    pub async fn run(self) -> Result<(), GatewayError> {
        let token = CancellationToken::new();
        let on_signal = token.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            on_signal.cancel();
        });
        self.run_until_cancelled(token).await
    }
}

#[cfg(test)]
mod tests;
