#![doc(html_root_url = "https://docs.rs/wiregate/latest")]
//! Public API for the `wiregate` library.
//!
//! `wiregate` hosts TCP services speaking a length-prefixed stream protocol,
//! an HTTP/1.1 subset or WebSocket, and builds an API gateway on top of them:
//! external HTTP requests are relayed to service providers attached over the
//! stream protocol and answered with the providers' responses.
//!
//! The layers, bottom up:
//!
//! - [`codec`]: per-protocol framing, decoding and encoding.
//! - [`reassembler`]: turns a byte stream into complete frames for a codec.
//! - [`connection`]: the per-connection driver, handles and handler trait.
//! - [`server`] and [`client`]: accepting and dialing connections.
//! - [`envelope`], [`gateway`] and [`provider`]: the gateway application.

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod panic;
pub mod provider;
pub mod reassembler;
pub mod server;

pub use codec::{Outbound, ProtocolCodec, ProtocolKind};
pub use connection::{ConnectionHandle, ConnectionHandler, ConnectionId, DefaultHandler};
pub use error::{Error, Result};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
