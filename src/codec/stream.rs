//! Length-prefixed binary stream protocol.
//!
//! Every message is a 4-byte big-endian body length followed by the body.
//! The prefix counts the body only, so a frame is `4 + prefix` bytes long.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{CodecError, FramingError, Outbound, ProtocolCodec, ProtocolKind};

/// Length prefix size in bytes.
pub const LENGTH_HEADER_SIZE: usize = 4;

/// Codec for the length-prefixed stream protocol.
#[derive(Clone, Debug, Default)]
pub struct StreamCodec {
    body_length: usize,
}

impl StreamCodec {
    /// Create a codec with no frame measured yet.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Body length of the most recently measured frame.
    #[must_use]
    pub fn body_length(&self) -> usize { self.body_length }
}

impl ProtocolCodec for StreamCodec {
    type Message = Bytes;

    const KIND: ProtocolKind = ProtocolKind::Stream;

    fn first_msg_length(&mut self, buf: &[u8]) -> Result<usize, CodecError> {
        if buf.is_empty() {
            return Err(FramingError::Empty.into());
        }
        if buf.len() < LENGTH_HEADER_SIZE {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: LENGTH_HEADER_SIZE,
            }
            .into());
        }

        let mut header = buf;
        let declared = header.get_u32();
        self.body_length = usize::try_from(declared)
            .map_err(|_| FramingError::MalformedLength(declared.to_string()))?;
        let total = LENGTH_HEADER_SIZE
            .checked_add(self.body_length)
            .ok_or_else(|| FramingError::MalformedLength(declared.to_string()))?;
        if total > buf.len() {
            return Err(FramingError::Incomplete {
                have: buf.len(),
                need: total,
            }
            .into());
        }
        Ok(total)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<Self::Message, CodecError> {
        let body = frame.get(LENGTH_HEADER_SIZE..).ok_or(FramingError::Incomplete {
            have: frame.len(),
            need: LENGTH_HEADER_SIZE,
        })?;
        Ok(Bytes::copy_from_slice(body))
    }

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        if payload.is_empty() {
            return Err(FramingError::EmptyFrame.into());
        }
        let len = u32::try_from(payload.len()).map_err(|_| FramingError::OversizedFrame {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        dst.reserve(LENGTH_HEADER_SIZE + payload.len());
        dst.put_u32(len);
        dst.extend_from_slice(payload);
        Ok(())
    }

    fn text_reply(body: &str) -> Outbound { Outbound::payload(body.to_owned()) }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn encoded(payload: &[u8]) -> BytesMut {
        let mut dst = BytesMut::new();
        StreamCodec::new()
            .encode(payload, &mut dst)
            .expect("encode should succeed");
        dst
    }

    #[test]
    fn empty_buffer_reports_empty() {
        let err = StreamCodec::new()
            .first_msg_length(&[])
            .expect_err("empty buffer has no frame");
        assert!(matches!(err, CodecError::Framing(FramingError::Empty)));
    }

    #[rstest]
    #[case::one(&[0x00])]
    #[case::three(&[0x00, 0x00, 0x00])]
    #[case::body_short(&[0x00, 0x00, 0x00, 0x05, b'a', b'b'])]
    fn short_buffers_are_incomplete(#[case] buf: &[u8]) {
        let err = StreamCodec::new()
            .first_msg_length(buf)
            .expect_err("short buffer has no frame");
        assert!(err.is_retryable(), "unexpected error: {err:?}");
    }

    #[test]
    fn frame_length_counts_header_and_body() {
        let wire = encoded(b"hello");
        assert_eq!(&wire[..4], &[0, 0, 0, 5]);
        let mut codec = StreamCodec::new();
        assert_eq!(codec.first_msg_length(&wire).expect("complete"), 9);
        assert_eq!(codec.body_length(), 5);
    }

    #[test]
    fn only_first_frame_is_measured() {
        let mut wire = encoded(b"one");
        wire.extend_from_slice(&encoded(b"second"));
        assert_eq!(
            StreamCodec::new().first_msg_length(&wire).expect("complete"),
            7
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn largest_prefix_waits_for_the_whole_frame() {
        let err = StreamCodec::new()
            .first_msg_length(&[0xFF, 0xFF, 0xFF, 0xFF, b'x'])
            .expect_err("body not buffered");
        let need = LENGTH_HEADER_SIZE + usize::try_from(u32::MAX).expect("fits on 64-bit");
        assert!(matches!(
            err,
            CodecError::Framing(FramingError::Incomplete { have: 5, need: n }) if n == need
        ));
    }

    #[cfg(not(target_pointer_width = "64"))]
    #[test]
    fn largest_prefix_overflowing_usize_is_malformed() {
        let err = StreamCodec::new()
            .first_msg_length(&[0xFF, 0xFF, 0xFF, 0xFF, b'x'])
            .expect_err("length cannot be represented");
        assert!(matches!(
            err,
            CodecError::Framing(FramingError::MalformedLength(_))
        ));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let mut dst = BytesMut::new();
        let err = StreamCodec::new()
            .encode(b"", &mut dst)
            .expect_err("empty payload");
        assert!(matches!(err, CodecError::Framing(FramingError::EmptyFrame)));
        assert!(dst.is_empty());
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(body in proptest::collection::vec(any::<u8>(), 1..512)) {
            let wire = encoded(&body);
            let mut codec = StreamCodec::new();
            let len = codec.first_msg_length(&wire).expect("complete");
            prop_assert_eq!(len, wire.len());
            let decoded = codec.decode(&wire[..len]).expect("decode");
            prop_assert_eq!(decoded.as_ref(), body.as_slice());
        }

        #[test]
        fn buffers_under_four_bytes_never_report_a_length(
            buf in proptest::collection::vec(any::<u8>(), 0..4)
        ) {
            let err = StreamCodec::new().first_msg_length(&buf).expect_err("too short");
            prop_assert!(err.is_retryable());
        }
    }
}
