use crate::error::CodecError;
use crate::request::MessageId;
use bytes::{Bytes, BytesMut};

/// One application-level message recovered from a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: MessageId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(msg_id: impl Into<MessageId>, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_id: msg_id.into(),
            payload: payload.into(),
        }
    }
}

/// Pluggable framing strategy.
///
/// Implementations are stateless: per-connection partial-frame state lives in the
/// read buffer owned by the reactor shard servicing that connection.
pub trait FrameCodec: Send + Sync + 'static {
    /// Decodes at most one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` while the buffered bytes do not yet hold a full frame,
    /// leaving `src` untouched. An error means the stream is unrecoverable and the
    /// connection is closed.
    fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError>;

    /// Appends one encoded frame to `dst`.
    fn encode(&self, msg_id: MessageId, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError>;

    fn pack(&self, msg_id: MessageId, payload: &[u8]) -> Result<Bytes, CodecError> {
        let mut dst = BytesMut::new();
        self.encode(msg_id, payload, &mut dst)?;
        Ok(dst.freeze())
    }
}
