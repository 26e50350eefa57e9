//! Test harness for `wiregate` connections.
//!
//! The helpers run a connection on a `tokio::io::duplex` stream, feed it
//! bytes in caller-chosen chunks, and return everything it wrote back, so
//! framing behaviour can be asserted without sockets. The [`net`] module
//! provides loopback listeners and wire-level readers for socket tests.
//!
//! ```rust
//! use wiregate::{codec::StreamCodec, connection::DefaultHandler};
//! use wiregate_testing::{drive_connection, stream_frame};
//!
//! # async fn example() -> std::io::Result<()> {
//! let out = drive_connection(
//!     StreamCodec::new(),
//!     &DefaultHandler::new("svc"),
//!     vec![stream_frame(b"hi")],
//! )
//! .await?;
//! assert_eq!(out, stream_frame(b"this is svc."));
//! # Ok(())
//! # }
//! ```

pub mod helpers;
pub mod net;

pub use helpers::{
    DEFAULT_CAPACITY,
    drive_connection,
    drive_connection_with_capacity,
    drive_with_chunks,
    http_request,
    split_every,
    stream_frame,
};
pub use net::{connect, free_listener, read_stream_frame, read_to_close};
