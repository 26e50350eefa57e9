//! In-memory driving of connections.

use std::{future::Future, io, panic::AssertUnwindSafe};

use futures::FutureExt as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
use tokio_util::sync::CancellationToken;
use wiregate::{
    codec::ProtocolCodec,
    connection::{Connection, ConnectionHandler},
    panic::format_panic,
    reassembler::DEFAULT_MAX_FRAME_LENGTH,
};

/// Duplex buffer size used when none is given.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Run `server_fn` against a duplex stream, writing each chunk to the client
/// half as a separate write and returning the bytes produced by the server.
///
/// Each chunk is followed by a yield so the server observes it as its own
/// read. Writing stops early if the server hangs up. A panicking server
/// surfaces as an `io::Error` beginning with `"server task failed"`.
///
/// ```rust
/// use tokio::io::{AsyncWriteExt, DuplexStream};
/// use wiregate_testing::drive_with_chunks;
///
/// async fn greet(mut server: DuplexStream) { let _ = server.write_all(b"hi").await; }
///
/// # async fn demo() -> std::io::Result<()> {
/// let bytes = drive_with_chunks(greet, vec![vec![0]], 64).await?;
/// assert_eq!(bytes, b"hi");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns any I/O error from the client half other than the server hanging
/// up, or the formatted panic of the server task.
pub async fn drive_with_chunks<F, Fut>(
    server_fn: F,
    chunks: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<Vec<u8>>
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = ()>,
{
    let (mut client, server) = duplex(capacity);

    let server_fut = async {
        match AssertUnwindSafe(server_fn(server)).catch_unwind().await {
            Ok(()) => Ok(()),
            Err(panic) => Err(io::Error::other(format!(
                "server task failed: {}",
                format_panic(panic)
            ))),
        }
    };

    let client_fut = async {
        for chunk in &chunks {
            match client.write_all(chunk).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
                Err(e) => return Err(e),
            }
            tokio::task::yield_now().await;
        }
        let _ = client.shutdown().await;

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await?;
        io::Result::Ok(buf)
    };

    let ((), buf) = tokio::try_join!(server_fut, client_fut)?;
    Ok(buf)
}

/// Run a [`Connection`] for `codec` and `handler` over a duplex stream fed
/// with `chunks`, returning everything it wrote.
///
/// # Errors
///
/// See [`drive_with_chunks`].
pub async fn drive_connection<C, H>(
    codec: C,
    handler: &H,
    chunks: Vec<Vec<u8>>,
) -> io::Result<Vec<u8>>
where
    C: ProtocolCodec,
    H: ConnectionHandler<C>,
{
    drive_connection_with_capacity(codec, handler, chunks, DEFAULT_CAPACITY).await
}

/// [`drive_connection`] with an explicit duplex buffer size.
///
/// # Errors
///
/// See [`drive_with_chunks`].
pub async fn drive_connection_with_capacity<C, H>(
    codec: C,
    handler: &H,
    chunks: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<Vec<u8>>
where
    C: ProtocolCodec,
    H: ConnectionHandler<C>,
{
    drive_with_chunks(
        |server| async move {
            let conn = Connection::new(server, "duplex", codec, DEFAULT_MAX_FRAME_LENGTH);
            let _ = conn.run(handler, CancellationToken::new()).await;
        },
        chunks,
        capacity,
    )
    .await
}

/// Encode `body` as a length-prefixed stream frame.
///
/// # Panics
///
/// Panics if `body` is longer than `u32::MAX` bytes.
#[must_use]
pub fn stream_frame(body: &[u8]) -> Vec<u8> {
    let len = u32::try_from(body.len()).expect("test frame fits a u32 length");
    let mut wire = len.to_be_bytes().to_vec();
    wire.extend_from_slice(body);
    wire
}

/// Split `bytes` into chunks of at most `size` bytes.
#[must_use]
pub fn split_every(bytes: &[u8], size: usize) -> Vec<Vec<u8>> {
    bytes.chunks(size.max(1)).map(<[u8]>::to_vec).collect()
}

/// A minimal HTTP/1.1 request with a `Content-Length` header.
#[must_use]
pub fn http_request(method: &str, target: &str, body: &str) -> Vec<u8> {
    format!(
        "{method} {target} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}
