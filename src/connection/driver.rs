//! The per-connection task loop.

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    select,
    sync::mpsc,
};
use tokio_util::{codec::Framed, sync::CancellationToken};
use tracing::{debug, info, trace};

use super::{Command, ConnectionError, ConnectionHandle, ConnectionHandler};
use crate::{
    codec::{Outbound, ProtocolCodec, Step},
    metrics::{self, Direction},
    reassembler::FrameReassembler,
};

type Transport<S, C> = Framed<S, FrameReassembler<C>>;

/// A socket bound to a protocol codec, ready to run.
///
/// Create it, take a [`handle`](Self::handle) if other tasks need to reach
/// the connection, then [`run`](Self::run) it to completion.
pub struct Connection<S, C> {
    framed: Transport<S, C>,
    handle: ConnectionHandle,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl<S, C> Connection<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: ProtocolCodec,
{
    /// Wrap `io`, refusing inbound frames larger than `max_frame_length`.
    pub fn new(io: S, peer: &str, codec: C, max_frame_length: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            framed: Framed::new(io, FrameReassembler::new(codec, max_frame_length)),
            handle: ConnectionHandle::new(peer, tx),
            rx,
        }
    }

    /// Handle for queueing writes from other tasks.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle { self.handle.clone() }

    /// Drive the connection until the peer leaves, an error occurs, a close
    /// is requested or `shutdown` fires.
    ///
    /// [`ConnectionHandler::on_close`] runs exactly once before returning.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the connection. Peer-initiated closes
    /// (EOF at a frame boundary, WebSocket close frames) return `Ok`.
    pub async fn run<H>(self, handler: &H, shutdown: CancellationToken) -> Result<(), ConnectionError>
    where
        H: ConnectionHandler<C> + ?Sized,
    {
        let Self {
            mut framed,
            handle,
            mut rx,
        } = self;
        let protocol = C::KIND.as_str();
        metrics::inc_connections(protocol);
        info!(
            id = %handle.id(),
            peer = handle.remote_addr(),
            protocol,
            "connection opened"
        );

        let outcome = pump(&mut framed, &handle, &mut rx, handler, &shutdown).await;

        handle.mark_closed();
        rx.close();
        if let Err(err) = SinkExt::<Outbound>::close(&mut framed).await {
            debug!(peer = handle.remote_addr(), error = %err, "socket shutdown failed");
        }

        let outcome = match outcome {
            Err(err) if err.is_graceful_close() => Ok(()),
            other => other,
        };
        if let Err(err) = &outcome {
            metrics::inc_errors(err.error_type());
            handler.on_error(&handle, err).await;
        }
        handler.on_close(&handle).await;
        metrics::dec_connections(protocol);
        info!(
            id = %handle.id(),
            peer = handle.remote_addr(),
            protocol,
            "connection closed"
        );
        outcome
    }
}

async fn pump<S, C, H>(
    framed: &mut Transport<S, C>,
    handle: &ConnectionHandle,
    rx: &mut mpsc::UnboundedReceiver<Command>,
    handler: &H,
    shutdown: &CancellationToken,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: ProtocolCodec,
    H: ConnectionHandler<C> + ?Sized,
{
    if let Some(greeting) = framed.codec_mut().codec_mut().on_connect() {
        framed.send(greeting).await?;
    }
    handler.on_connect(handle).await;

    let closes_after_reply = framed.codec().codec().closes_after_reply();
    let mut awaiting_reply = false;
    loop {
        select! {
            biased;

            () = shutdown.cancelled() => return Ok(()),
            command = rx.recv() => match command {
                Some(Command::Send(outbound)) => {
                    framed.send(outbound).await?;
                    metrics::inc_frames(Direction::Outbound);
                    if awaiting_reply {
                        return Ok(());
                    }
                }
                Some(Command::Close) | None => return Ok(()),
            },
            frame = framed.next(), if !awaiting_reply => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                let message = frame?;
                metrics::inc_frames(Direction::Inbound);
                trace!(peer = handle.remote_addr(), ?message, "frame decoded");
                match framed.codec_mut().codec_mut().on_message(message) {
                    Step::Deliver(message) => {
                        awaiting_reply = closes_after_reply;
                        handler.on_request(handle, message).await;
                    }
                    Step::Reply(outbound) => framed.send(outbound).await?,
                    Step::Reject(reply, err) => {
                        if let Some(reply) = reply {
                            framed.send(reply).await?;
                        }
                        return Err(err.into());
                    }
                }
            }
        }
    }
}
