//! Framing for both directions of a camlink connection.
//!
//! - [`FrameReader`] pulls [`Frame`]s off the camera → server stream one
//!   exact-size read at a time, so an unknown tag can be reported without
//!   tearing the stream down.
//! - [`FrameCodec`] writes frames through `tokio_util`'s `FramedWrite`.
//! - [`SelectionCodec`] carries the one-byte server → camera channel.

mod reader;

pub use reader::FrameReader;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CamError;
use crate::frame::{Frame, Selection};

// ── FrameCodec ───────────────────────────────────────────────────

/// Encoder for the camera → server direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = CamError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

// ── SelectionCodec ───────────────────────────────────────────────

/// One byte per item on the server → camera direction.
///
/// Decoding yields the raw byte; range validation is left to the caller
/// so that a bad value can be logged and ignored instead of ending the
/// stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionCodec;

impl Decoder for SelectionCodec {
    type Item = u8;
    type Error = CamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        Ok(Some(src.get_u8()))
    }
}

impl Encoder<Selection> for SelectionCodec {
    type Error = CamError;

    fn encode(&mut self, item: Selection, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(item.get());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frame_codec_writes_wire_format() {
        let mut dst = BytesMut::new();
        FrameCodec.encode(Frame::Timing(2.0), &mut dst).unwrap();
        FrameCodec
            .encode(Frame::Camera(Bytes::from_static(b"jp")), &mut dst)
            .unwrap();

        let mut expected = vec![b't'];
        expected.extend_from_slice(&2.0f64.to_be_bytes());
        expected.extend_from_slice(&[b'c', 0, 0, 0, 2, b'j', b'p']);
        assert_eq!(&dst[..], &expected[..]);
    }

    #[test]
    fn selection_codec_one_byte_per_item() {
        let mut src = BytesMut::from(&[3u8, 0, 7][..]);
        let mut codec = SelectionCodec;
        assert_eq!(codec.decode(&mut src).unwrap(), Some(3));
        // Out-of-range values pass through untouched.
        assert_eq!(codec.decode(&mut src).unwrap(), Some(0));
        assert_eq!(codec.decode(&mut src).unwrap(), Some(7));
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn selection_codec_encode() {
        let mut dst = BytesMut::new();
        SelectionCodec
            .encode(Selection::new(4).unwrap(), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[4]);
    }
}
