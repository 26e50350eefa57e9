//! Metric helpers for `wiregate`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections, labelled by protocol.
pub const CONNECTIONS_ACTIVE: &str = "wiregate_connections_active";
/// Name of the counter tracking decoded and written messages.
pub const FRAMES_PROCESSED: &str = "wiregate_frames_processed_total";
/// Name of the counter tracking connection errors, labelled by category.
pub const ERRORS_TOTAL: &str = "wiregate_errors_total";
/// Name of the counter tracking connection task panics.
pub const CONNECTION_PANICS: &str = "wiregate_connection_panics_total";
/// Name of the counter tracking requests routed by the gateway.
pub const GATEWAY_DISPATCHED: &str = "wiregate_gateway_dispatched_total";
/// Name of the counter tracking external requests for unserved routes.
pub const ROUTE_MISSES: &str = "wiregate_gateway_route_misses_total";
/// Name of the gauge tracking registered service providers.
pub const PROVIDERS_REGISTERED: &str = "wiregate_providers_registered";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Messages decoded from a peer.
    Inbound,
    /// Messages written to a peer.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge for `protocol`.
pub fn inc_connections(protocol: &'static str) {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE, "protocol" => protocol).increment(1.0);
    #[cfg(not(feature = "metrics"))]
    let _ = protocol;
}

/// Decrement the open connections gauge for `protocol`.
pub fn dec_connections(protocol: &'static str) {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE, "protocol" => protocol).decrement(1.0);
    #[cfg(not(feature = "metrics"))]
    let _ = protocol;
}

/// Record a processed message for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a connection error of category `kind`.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a panicking connection task.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_PANICS).increment(1);
}

/// Record a request forwarded to a provider.
pub fn inc_dispatched() {
    #[cfg(feature = "metrics")]
    counter!(GATEWAY_DISPATCHED).increment(1);
}

/// Record an external request no provider could serve.
pub fn inc_route_misses() {
    #[cfg(feature = "metrics")]
    counter!(ROUTE_MISSES).increment(1);
}

/// Set the number of registered providers.
#[cfg_attr(
    feature = "metrics",
    expect(
        clippy::cast_precision_loss,
        reason = "provider counts are far below f64's exact integer range"
    )
)]
pub fn set_providers(count: usize) {
    #[cfg(feature = "metrics")]
    gauge!(PROVIDERS_REGISTERED).set(count as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}
