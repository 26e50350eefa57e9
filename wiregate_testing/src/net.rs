//! Loopback socket helpers.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    time::Duration,
};

use rstest::fixture;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::TcpStream,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns a bound [`StdTcpListener`] on a free loopback port.
///
/// Keeping the listener bound prevents another process claiming the port
/// between discovery and use.
///
/// # Panics
///
/// Panics if no loopback port can be bound.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

/// Dial `addr`.
///
/// # Errors
///
/// Returns the connect error.
pub async fn connect(addr: SocketAddr) -> io::Result<TcpStream> { TcpStream::connect(addr).await }

async fn bounded<T>(fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
    timeout(READ_TIMEOUT, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "peer did not answer in time"))?
}

/// Read one length-prefixed stream frame body.
///
/// # Errors
///
/// Returns an error on EOF, I/O failure or after a five second timeout.
pub async fn read_stream_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    bounded(async {
        let len = reader.read_u32().await?;
        let len = usize::try_from(len).map_err(io::Error::other)?;
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        Ok(body)
    })
    .await
}

/// Read until the peer closes.
///
/// # Errors
///
/// Returns an error on I/O failure or after a five second timeout.
pub async fn read_to_close<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    bounded(async {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    })
    .await
}
