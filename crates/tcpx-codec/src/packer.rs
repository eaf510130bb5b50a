use bytes::{Buf, BufMut, BytesMut};
use tcpx_core::{CodecError, Frame, FrameCodec, MessageId};

/// `[payload_len: u32 LE][msg_id: u32 LE]`
pub const HEADER_LEN: usize = 8;

/// Built-in length-prefixed codec.
///
/// Frames are an 8-byte little-endian header followed by the payload. The
/// declared length is checked against `max_frame_len` before any payload is
/// buffered.
#[derive(Debug, Clone)]
pub struct DataPacker {
    max_frame_len: usize,
}

impl DataPacker {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for DataPacker {
    fn default() -> Self {
        Self::new(1 << 20)
    }
}

impl FrameCodec for DataPacker {
    fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let len = header.get_u32_le() as usize;
        let msg_id = header.get_u32_le();

        if len > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame {
            msg_id: MessageId(msg_id),
            payload,
        }))
    }

    fn encode(&self, msg_id: MessageId, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
        if payload.len() > self.max_frame_len {
            return Err(CodecError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }
        let len = u32::try_from(payload.len())
            .map_err(|_| CodecError::Malformed(format!("payload length {} overflows u32", payload.len())))?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32_le(len);
        dst.put_u32_le(msg_id.0);
        dst.put_slice(payload);
        Ok(())
    }
}
