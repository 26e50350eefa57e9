//! Bridge between [`ProtocolCodec`] and `tokio_util`'s framing traits.
//!
//! [`FrameReassembler`] owns the connection's receive buffer policy: it asks
//! the codec where the first message ends, splits exactly that many bytes
//! off the front of the buffer and hands them to the codec for decoding.
//! Partial frames stay buffered until more bytes arrive; several complete
//! frames arriving in one read are yielded one at a time.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{CodecError, EofError, FramingError, Outbound, ProtocolCodec};

/// Default receive buffer capacity: 10 MiB.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 10 * 1024 * 1024;

/// Adapts a [`ProtocolCodec`] into a [`Decoder`] and [`Encoder`].
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use wiregate::{codec::StreamCodec, reassembler::FrameReassembler};
///
/// let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
/// let mut buf = BytesMut::from(&[0, 0, 0, 2, b'h'][..]);
/// assert!(framer.decode(&mut buf).expect("waiting").is_none());
/// buf.extend_from_slice(b"i");
/// assert_eq!(framer.decode(&mut buf).expect("frame").as_deref(), Some(&b"hi"[..]));
/// assert!(buf.is_empty());
/// ```
#[derive(Debug)]
pub struct FrameReassembler<C> {
    codec: C,
    max_frame_length: usize,
}

impl<C: ProtocolCodec> FrameReassembler<C> {
    /// Wrap `codec`, refusing frames larger than `max_frame_length` bytes.
    #[must_use]
    pub fn new(codec: C, max_frame_length: usize) -> Self {
        Self {
            codec,
            max_frame_length: max_frame_length.max(1),
        }
    }

    /// Shared access to the wrapped codec.
    #[must_use]
    pub fn codec(&self) -> &C { &self.codec }

    /// Mutable access to the wrapped codec.
    pub fn codec_mut(&mut self) -> &mut C { &mut self.codec }

    /// Receive buffer capacity in bytes.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn oversized(&self, size: usize) -> CodecError {
        FramingError::OversizedFrame {
            size,
            max: self.max_frame_length,
        }
        .into()
    }
}

impl<C: ProtocolCodec> Decoder for FrameReassembler<C> {
    type Item = C::Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.codec.first_msg_length(src) {
            Ok(len) => len,
            Err(CodecError::Framing(FramingError::Incomplete { need, .. }))
                if need > self.max_frame_length =>
            {
                return Err(self.oversized(need));
            }
            Err(err) if err.is_retryable() => {
                // A marker-delimited frame that never terminates fills the buffer.
                if src.len() >= self.max_frame_length {
                    return Err(self.oversized(src.len()));
                }
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        if len > self.max_frame_length {
            return Err(self.oversized(len));
        }
        let frame = src.split_to(len);
        self.codec.decode(&frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            Ok(None)
        } else {
            Err(EofError::MidFrame {
                bytes_buffered: src.len(),
            }
            .into())
        }
    }
}

impl<C: ProtocolCodec> Encoder<Outbound> for FrameReassembler<C> {
    type Error = CodecError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outbound::Payload(payload) => self.codec.encode(&payload, dst),
            Outbound::Raw(bytes) => {
                dst.extend_from_slice(&bytes);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::codec::{HttpCodec, StreamCodec};

    fn stream_frame(body: &[u8]) -> Vec<u8> {
        let mut wire = Vec::with_capacity(4 + body.len());
        wire.put_u32(u32::try_from(body.len()).expect("small body"));
        wire.extend_from_slice(body);
        wire
    }

    fn drain<C: ProtocolCodec>(
        framer: &mut FrameReassembler<C>,
        buf: &mut BytesMut,
    ) -> Vec<C::Message> {
        let mut out = Vec::new();
        while let Some(msg) = framer.decode(buf).expect("decode should succeed") {
            out.push(msg);
        }
        out
    }

    #[test]
    fn yields_each_frame_of_a_batched_read() {
        let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
        let mut buf = BytesMut::new();
        for body in [&b"one"[..], b"two", b"three"] {
            buf.extend_from_slice(&stream_frame(body));
        }
        let frames = drain(&mut framer, &mut buf);
        assert_eq!(
            frames,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three")
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn keeps_trailing_partial_frame() {
        let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&stream_frame(b"whole"));
        buf.extend_from_slice(&stream_frame(b"partial")[..6]);
        assert_eq!(drain(&mut framer, &mut buf).len(), 1);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn declared_length_over_capacity_is_fatal() {
        let mut framer = FrameReassembler::new(StreamCodec::new(), 16);
        let mut buf = BytesMut::from(&[0, 0, 0, 64][..]);
        let err = framer.decode(&mut buf).expect_err("oversized");
        assert!(matches!(
            err,
            CodecError::Framing(FramingError::OversizedFrame { size: 68, max: 16 })
        ));
    }

    #[test]
    fn unterminated_header_filling_the_buffer_is_fatal() {
        let mut framer = FrameReassembler::new(HttpCodec::new(), 32);
        let mut buf = BytesMut::from(&[b'a'; 32][..]);
        let err = framer.decode(&mut buf).expect_err("buffer full");
        assert!(matches!(
            err,
            CodecError::Framing(FramingError::OversizedFrame { size: 32, .. })
        ));
    }

    #[test]
    fn pipelined_http_requests_split_cleanly() {
        let mut framer = FrameReassembler::new(HttpCodec::new(), 1024);
        let mut buf = BytesMut::from(
            &b"GET /a HTTP/1.1\r\n\r\nPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nhi"[..],
        );
        let messages = drain(&mut framer, &mut buf);
        let paths: Vec<_> = messages.iter().filter_map(|m| m.path()).collect();
        assert_eq!(paths, ["/a", "/b"]);
        assert_eq!(messages[1].body.as_ref(), b"hi");
    }

    #[rstest]
    #[case::clean(&[][..], true)]
    #[case::mid_frame(&[0, 0, 0, 9, 1][..], false)]
    fn eof_reports_buffered_bytes(#[case] bytes: &[u8], #[case] clean: bool) {
        let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
        let mut buf = BytesMut::from(bytes);
        let result = framer.decode_eof(&mut buf);
        if clean {
            assert!(matches!(result, Ok(None)));
        } else {
            assert!(matches!(
                result,
                Err(CodecError::Eof(EofError::MidFrame { bytes_buffered: 5 }))
            ));
        }
    }

    #[test]
    fn raw_outbound_bypasses_the_codec() {
        let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
        let mut dst = BytesMut::new();
        framer
            .encode(Outbound::raw("verbatim"), &mut dst)
            .expect("encode");
        framer.encode(Outbound::payload("x"), &mut dst).expect("encode");
        assert_eq!(dst.as_ref(), b"verbatim\0\0\0\x01x");
    }

    proptest! {
        #[test]
        fn arbitrary_chunking_preserves_frames(
            bodies in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 1..64),
                1..8,
            ),
            chunk in 1usize..16,
        ) {
            let wire: Vec<u8> = bodies.iter().flat_map(|b| stream_frame(b)).collect();
            let mut framer = FrameReassembler::new(StreamCodec::new(), 1024);
            let mut buf = BytesMut::new();
            let mut seen = Vec::new();
            for piece in wire.chunks(chunk) {
                buf.extend_from_slice(piece);
                seen.extend(drain(&mut framer, &mut buf));
            }
            let seen: Vec<Vec<u8>> = seen.into_iter().map(|b| b.to_vec()).collect();
            prop_assert_eq!(seen, bodies);
            prop_assert!(buf.is_empty());
        }
    }
}
