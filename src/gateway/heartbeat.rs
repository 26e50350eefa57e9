//! Periodic pings to registered providers.
//!
//! Liveness is passive: answers are only logged, and a provider leaves the
//! ping set when its connection closes, never because a pong went missing.

use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Gateway;
use crate::envelope::Envelope;

impl Gateway {
    /// Send one ping to every provider in the ping set. Returns how many
    /// pings were queued.
    pub fn ping_providers(&self) -> usize {
        let mut sent = 0;
        for (addr, conn) in self.registry().ping_targets() {
            let outbound = match Envelope::ping(addr.as_str()).to_outbound() {
                Ok(outbound) => outbound,
                Err(err) => {
                    warn!(provider = %addr, error = %err, "failed to encode ping");
                    continue;
                }
            };
            match conn.send(outbound) {
                Ok(()) => sent += 1,
                Err(err) => debug!(provider = %addr, error = %err, "ping not queued"),
            }
        }
        debug!(sent, "heartbeat sweep");
        sent
    }
}

/// Ping all providers every `period` until `shutdown` fires. The first sweep
/// runs immediately.
pub async fn run_heartbeat(gateway: Arc<Gateway>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                gateway.ping_providers();
            }
        }
    }
}
