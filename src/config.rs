//! Typed configuration for services and the gateway.
//!
//! Every struct has a `Default` matching the stock deployment and
//! builder-style setters for overriding individual fields.

use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use crate::{reassembler::DEFAULT_MAX_FRAME_LENGTH, server::BackoffConfig};

/// Default limit on simultaneously open connections per service.
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;
/// Default provider-facing gateway address.
pub const DEFAULT_INNER_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    9501,
);
/// Default external-facing gateway address.
pub const DEFAULT_OPEN_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    9502,
);
/// Default interval between heartbeat sweeps.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for one listening or dialing service.
///
/// ```
/// use wiregate::config::ServiceConfig;
///
/// let cfg = ServiceConfig::new("stream-service", ([127, 0, 0, 1], 9000).into())
///     .with_max_connections(8);
/// assert_eq!(cfg.max_connections, 8);
/// assert_eq!(cfg.max_frame_length, 10 * 1024 * 1024);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Name used in logs and default replies.
    pub name: String,
    /// Address to bind (servers) or dial (clients).
    pub address: SocketAddr,
    /// Receive buffer capacity; larger frames close the connection.
    pub max_frame_length: usize,
    /// Connections accepted beyond this are closed immediately.
    pub max_connections: usize,
    /// Accept-loop retry timing.
    pub backoff: BackoffConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service".to_owned(),
            address: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Configuration for `name` at `address` with default limits.
    #[must_use]
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            name: name.into(),
            address,
            ..Self::default()
        }
    }

    /// Override the receive buffer capacity.
    #[must_use]
    pub fn with_max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = len.max(1);
        self
    }

    /// Override the connection limit.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Override accept-loop back-off.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff.normalized();
        self
    }
}

/// Settings for the gateway's two listeners and its heartbeat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Provider-facing (stream protocol) listener.
    pub inner: ServiceConfig,
    /// External-facing (HTTP) listener.
    pub open: ServiceConfig,
    /// Period between heartbeat pings to registered providers.
    pub heartbeat_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            inner: ServiceConfig::new("gateway-inner", DEFAULT_INNER_ADDR),
            open: ServiceConfig::new("gateway-open", DEFAULT_OPEN_ADDR),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl GatewayConfig {
    /// Override the provider-facing address.
    #[must_use]
    pub fn with_inner_addr(mut self, address: SocketAddr) -> Self {
        self.inner.address = address;
        self
    }

    /// Override the external-facing address.
    #[must_use]
    pub fn with_open_addr(mut self, address: SocketAddr) -> Self {
        self.open.address = address;
        self
    }

    /// Override the heartbeat period. Zero is raised to one millisecond.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_defaults_match_the_stock_deployment() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.inner.address.to_string(), "127.0.0.1:9501");
        assert_eq!(cfg.open.address.to_string(), "127.0.0.1:9502");
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(cfg.inner.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn setters_clamp_degenerate_values() {
        let cfg = ServiceConfig::default()
            .with_max_frame_length(0)
            .with_max_connections(0);
        assert_eq!(cfg.max_frame_length, 1);
        assert_eq!(cfg.max_connections, 1);
        let gw = GatewayConfig::default().with_heartbeat_interval(Duration::ZERO);
        assert_eq!(gw.heartbeat_interval, Duration::from_millis(1));
    }
}
