//! The accept loop.

use std::sync::{Arc, atomic::AtomicUsize};

use log::warn;
use tokio::{net::TcpListener, select, time::sleep};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    codec::ProtocolCodec,
    connection::ConnectionHandler,
    server::connection::{ConnectionLimits, spawn_connection_task},
};

/// Everything the accept loop hands to each connection task.
pub(in crate::server) struct AcceptContext<H> {
    pub handler: Arc<H>,
    pub limits: ConnectionLimits,
    pub active: Arc<AtomicUsize>,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections until `shutdown` is cancelled.
///
/// Accept failures are logged and retried after a delay that doubles up to
/// the configured maximum; a successful accept resets the delay.
pub(in crate::server) async fn accept_loop<C, H>(listener: TcpListener, ctx: AcceptContext<H>)
where
    C: ProtocolCodec + Default,
    H: ConnectionHandler<C>,
{
    let backoff = ctx.backoff.normalized();
    let mut delay = backoff.initial_delay;
    loop {
        select! {
            biased;

            () = ctx.shutdown.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    spawn_connection_task::<C, H>(stream, peer, &ctx);
                    delay = backoff.initial_delay;
                }
                Err(e) => {
                    let local_addr = listener.local_addr().ok();
                    warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                    sleep(delay).await;
                    delay = backoff.next_delay(delay);
                }
            },
        }
    }
}
