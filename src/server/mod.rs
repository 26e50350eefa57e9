//! Tokio-based TCP server hosting one protocol.
//!
//! A [`Server`] binds a listener, accepts connections with exponential
//! back-off on accept errors, and runs each connection on its own tracked
//! task using a fresh codec from `C::default()` and the shared handler.

use std::{
    io,
    marker::PhantomData,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use thiserror::Error;
use tokio::{net::TcpListener, sync::oneshot};

use crate::{codec::ProtocolCodec, config::ServiceConfig, connection::ConnectionHandler};

mod connection;
mod runtime;

pub use runtime::BackoffConfig;

/// Errors raised while setting up or running a [`Server`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The listener could not be prepared for accepting connections.
    #[error("accept error: {0}")]
    Accept(#[from] io::Error),
}

/// A bound server for protocol `C` with handler `H`.
///
/// ```no_run
/// use std::sync::Arc;
///
/// use wiregate::{
///     codec::StreamCodec,
///     config::ServiceConfig,
///     connection::DefaultHandler,
///     server::Server,
/// };
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), wiregate::server::ServerError> {
/// let config = ServiceConfig::new("stream-service", ([127, 0, 0, 1], 9000).into());
/// let handler = Arc::new(DefaultHandler::new("stream-service"));
/// Server::<StreamCodec, _>::bind(config, handler).await?.run().await
/// # }
/// ```
pub struct Server<C, H> {
    config: ServiceConfig,
    handler: Arc<H>,
    listener: TcpListener,
    ready_tx: Option<oneshot::Sender<()>>,
    _codec: PhantomData<fn() -> C>,
}

impl<C, H> Server<C, H>
where
    C: ProtocolCodec + Default,
    H: ConnectionHandler<C>,
{
    /// Bind `config.address`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound.
    pub async fn bind(config: ServiceConfig, handler: Arc<H>) -> Result<Self, ServerError> {
        let addr = config.address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self::with_listener(config, listener, handler))
    }

    /// Serve on an already bound standard listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if the listener cannot be switched to
    /// non-blocking mode or registered with the runtime.
    pub fn from_std(
        config: ServiceConfig,
        listener: StdTcpListener,
        handler: Arc<H>,
    ) -> Result<Self, ServerError> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        Ok(Self::with_listener(config, listener, handler))
    }

    fn with_listener(config: ServiceConfig, listener: TcpListener, handler: Arc<H>) -> Self {
        Self {
            config,
            handler,
            listener,
            ready_tx: None,
            _codec: PhantomData,
        }
    }

    /// Signal `tx` once the accept loop is running.
    #[must_use]
    pub fn with_ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Address actually bound, useful after binding port 0.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> { Ok(self.listener.local_addr()?) }

    /// Service configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig { &self.config }

    /// Shared connection handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<H> { &self.handler }
}
