//! Spawning of per-connection tasks.

use std::{
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::FutureExt;
use log::{debug, error, warn};
use tokio::net::TcpStream;

use super::runtime::AcceptContext;
use crate::{
    codec::ProtocolCodec,
    connection::{Connection, ConnectionHandler},
    metrics,
    panic::format_panic,
};

#[derive(Clone, Copy, Debug)]
pub(super) struct ConnectionLimits {
    pub max_connections: usize,
    pub max_frame_length: usize,
}

/// Releases a connection slot when the task ends, even by panic.
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::AcqRel); }
}

fn reserve_slot(active: &Arc<AtomicUsize>, max: usize) -> Option<SlotGuard> {
    active
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < max).then_some(n + 1)
        })
        .ok()
        .map(|_| SlotGuard(Arc::clone(active)))
}

/// Spawn a task running one connection, logging and discarding any panics.
///
/// Connections over the configured limit are dropped straight away.
pub(super) fn spawn_connection_task<C, H>(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &AcceptContext<H>,
) where
    C: ProtocolCodec + Default,
    H: ConnectionHandler<C>,
{
    let Some(slot) = reserve_slot(&ctx.active, ctx.limits.max_connections) else {
        warn!(
            "connection limit reached, refusing peer: peer_addr={peer}, max={}",
            ctx.limits.max_connections
        );
        return;
    };

    let handler = Arc::clone(&ctx.handler);
    let shutdown = ctx.shutdown.child_token();
    let max_frame_length = ctx.limits.max_frame_length;
    ctx.tracker.spawn(async move {
        let _slot = slot;
        let peer_addr = peer.to_string();
        let conn = Connection::new(stream, &peer_addr, C::default(), max_frame_length);
        let fut = AssertUnwindSafe(conn.run(&*handler, shutdown)).catch_unwind();

        match fut.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("connection ended with error: error={e}, peer_addr={peer}"),
            Err(panic) => {
                metrics::inc_connection_panics();
                let panic_msg = format_panic(panic);
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: panic={panic_msg}, peer_addr={peer}");
                tracing::error!(panic = %panic_msg, %peer, "connection task panicked");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_are_bounded_and_released() {
        let active = Arc::new(AtomicUsize::new(0));
        let first = reserve_slot(&active, 1).expect("free slot");
        assert!(reserve_slot(&active, 1).is_none());
        drop(first);
        assert_eq!(active.load(Ordering::Acquire), 0);
        assert!(reserve_slot(&active, 1).is_some());
    }
}
