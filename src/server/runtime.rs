//! Runtime control for [`Server`].

mod accept;
mod backoff;
#[cfg(test)]
mod tests;

use std::sync::{Arc, atomic::AtomicUsize};

pub(super) use accept::AcceptContext;
use accept::accept_loop;
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Server, ServerError, connection::ConnectionLimits};
use crate::{codec::ProtocolCodec, connection::ConnectionHandler};

impl<C, H> Server<C, H>
where
    C: ProtocolCodec + Default,
    H: ConnectionHandler<C>,
{
    /// Run until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Accept failures are retried with back-off and never surface; the
    /// `Result` is kept for setup errors raised by future listener options.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run until `shutdown` resolves.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tokio::sync::oneshot;
    /// use wiregate::{
    ///     codec::HttpCodec,
    ///     config::ServiceConfig,
    ///     connection::DefaultHandler,
    ///     server::Server,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), wiregate::server::ServerError> {
    /// let config = ServiceConfig::new("http-service", ([127, 0, 0, 1], 0).into());
    /// let server =
    ///     Server::<HttpCodec, _>::bind(config, Arc::new(DefaultHandler::new("http-service"))).await?;
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let task = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// task.await.expect("join server task")?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let serve = self.run_until_cancelled(token.clone());
        tokio::pin!(serve);
        select! {
            res = &mut serve => return res,
            () = shutdown => token.cancel(),
        }
        serve.await
    }

    /// Run until `token` is cancelled, then wait for open connections to end.
    ///
    /// Cancelling the token also ends every connection this server accepted.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_until_cancelled(self, token: CancellationToken) -> Result<(), ServerError> {
        let Server {
            config,
            handler,
            listener,
            ready_tx,
            ..
        } = self;
        let tracker = TaskTracker::new();
        let local_addr = listener.local_addr()?;
        info!(
            "service listening: name={}, protocol={}, addr={local_addr}",
            config.name,
            C::KIND
        );

        tracker.spawn(accept_loop::<C, H>(
            listener,
            AcceptContext {
                handler,
                limits: ConnectionLimits {
                    max_connections: config.max_connections,
                    max_frame_length: config.max_frame_length,
                },
                active: Arc::new(AtomicUsize::new(0)),
                shutdown: token.clone(),
                tracker: tracker.clone(),
                backoff: config.backoff,
            },
        ));

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        token.cancelled().await;
        tracker.close();
        tracker.wait().await;
        info!("service stopped: name={}", config.name);
        Ok(())
    }
}
