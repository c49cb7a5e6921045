//! Length-prefixed framing.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by exactly
//! that many payload bytes:
//!
//! ```text
//! +----------------+------------------------+
//! | length (4B BE) | payload (length bytes) |
//! +----------------+------------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ChannelError, FrameError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest payload the prefix can describe.
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

/// One unit of data on the wire. The length is always derived from the
/// payload, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    pub fn new(payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::TooLarge {
                length: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Frame { payload })
    }

    /// Value carried by the length prefix.
    pub fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Interprets the payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, ChannelError> {
        std::str::from_utf8(&self.payload).map_err(|source| ChannelError::DecodeFailure {
            length: self.len(),
            source,
        })
    }
}

/// `tokio_util` codec for [`Frame`]s.
///
/// The decoder remembers a length prefix it has already consumed, so a payload
/// split across any number of reads is reassembled before it is yielded.
#[derive(Debug, Default)]
pub struct FrameCodec {
    max_frame_length: Option<usize>,
    pending: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects frames whose payload is longer than `max` bytes in either
    /// direction.
    pub fn with_max_frame_length(max: usize) -> Self {
        FrameCodec {
            max_frame_length: Some(max),
            pending: None,
        }
    }

    pub fn max_frame_length(&self) -> Option<usize> {
        self.max_frame_length
    }

    fn check_length(&self, length: usize) -> Result<(), FrameError> {
        match self.max_frame_length {
            Some(max) if length > max => Err(FrameError::TooLarge { length, max }),
            _ => Ok(()),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let length = match self.pending {
            Some(length) => length,
            None => {
                if src.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let length = src.get_u32() as usize;
                self.check_length(length)?;
                self.pending = Some(length);
                length
            }
        };

        if src.len() < length {
            return Ok(None);
        }

        self.pending = None;
        Ok(Some(Frame {
            payload: src.split_to(length).freeze(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        match self.pending {
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::Incomplete {
                expected: LENGTH_PREFIX_LEN,
                received: src.len(),
            }),
            Some(expected) => Err(FrameError::Incomplete {
                expected,
                received: src.len(),
            }),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        self.check_length(frame.payload.len())?;
        dst.reserve(LENGTH_PREFIX_LEN + frame.payload.len());
        dst.put_u32(frame.len());
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new()
            .encode(Frame::new(payload.to_vec()).unwrap(), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn hello_wire_bytes() {
        let message = "Hello, TCP server!";
        let buf = encode(message.as_bytes());

        assert_eq!(&buf[..LENGTH_PREFIX_LEN], &[0x00, 0x00, 0x00, 0x12]);
        assert_eq!(&buf[LENGTH_PREFIX_LEN..], message.as_bytes());
    }

    #[test]
    fn prefix_counts_bytes_not_chars() {
        let message = "héllo, 世界 🦀";
        let buf = encode(message.as_bytes());

        let prefix = u32::from_be_bytes(buf[..4].try_into().unwrap());
        assert_eq!(prefix as usize, message.len());
        assert_ne!(prefix as usize, message.chars().count());
    }

    #[test]
    fn encode_decode_keeps_payload() {
        let mut codec = FrameCodec::new();
        let large = vec![0xffu8; 70_000];
        for payload in [&b""[..], &b"a"[..], &b"ack"[..], &large[..]] {
            let mut buf = encode(payload);
            let frame = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(frame.payload().as_ref(), payload);
            assert_eq!(frame.len() as usize, payload.len());
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn decode_waits_for_split_payload() {
        let mut codec = FrameCodec::new();
        let full = encode(b"Received your message");
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&full[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[2..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[7..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.text().unwrap(), "Received your message");
    }

    #[test]
    fn decode_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = encode(b"one");
        buf.extend_from_slice(&encode(b""));
        buf.extend_from_slice(&encode(b"three"));

        let got: Vec<_> = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .map(Frame::into_payload)
            .collect();
        assert_eq!(got, vec![Bytes::from("one"), Bytes::new(), Bytes::from("three")]);
    }

    #[test]
    fn eof_on_frame_boundary_is_clean() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn eof_inside_payload_is_incomplete() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.extend_from_slice(b"short");

        match codec.decode_eof(&mut buf) {
            Err(FrameError::Incomplete { expected, received }) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn eof_inside_prefix_is_incomplete() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::Incomplete { expected: 4, received: 2 })
        ));
    }

    #[test]
    fn oversized_prefix_rejected() {
        let mut codec = FrameCodec::with_max_frame_length(8);
        assert_eq!(codec.max_frame_length(), Some(8));
        assert_eq!(FrameCodec::new().max_frame_length(), None);
        let mut buf = BytesMut::new();
        buf.put_u32(9);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::TooLarge { length: 9, max: 8 })
        ));

        let mut out = BytesMut::new();
        let frame = Frame::new(&b"123456789"[..]).unwrap();
        assert!(codec.encode(frame, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn invalid_utf8_is_decode_failure() {
        let frame = Frame::new(vec![0x61, 0xff, 0x62]).unwrap();
        match frame.text() {
            Err(ChannelError::DecodeFailure { length, .. }) => assert_eq!(length, 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
