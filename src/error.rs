//! Crate-level error type.
//!
//! Each layer keeps its own error enum; [`Error`] gathers them for callers
//! such as the binary that drive several layers at once.

use thiserror::Error;

use crate::{
    codec::CodecError,
    connection::ConnectionError,
    envelope::EnvelopeError,
    gateway::GatewayError,
    server::ServerError,
};

/// Any error raised by `wiregate`.
#[derive(Debug, Error)]
pub enum Error {
    /// Wire protocol failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Connection failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Listener failure.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Envelope encoding failure.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// Gateway failure.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The Prometheus exporter could not be installed.
    #[cfg(feature = "metrics")]
    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
