use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message header: feature (1) + class (1) + message id (2 LE) = 4 bytes.
pub const MESSAGE_HEADER_SIZE: usize = 4;

/// Numeric identity of a catalog message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageKey {
    pub feature_id: u8,
    pub class_id: u8,
    pub message_id: u16,
}

impl MessageKey {
    pub const fn new(feature_id: u8, class_id: u8, message_id: u16) -> Self {
        Self {
            feature_id,
            class_id,
            message_id,
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.feature_id, self.class_id, self.message_id
        )
    }
}

/// An application message carried in a frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub feature_id: u8,
    pub class_id: u8,
    pub message_id: u16,
    /// Catalog-encoded argument bytes, opaque at this layer.
    pub args: Bytes,
}

impl Message {
    pub fn new(key: MessageKey, args: impl Into<Bytes>) -> Self {
        Self {
            feature_id: key.feature_id,
            class_id: key.class_id,
            message_id: key.message_id,
            args: args.into(),
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.feature_id, self.class_id, self.message_id)
    }

    /// Returns true if this message has the given identity.
    pub fn matches(&self, key: MessageKey) -> bool {
        self.key() == key
    }

    /// Encode this message into a fresh buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + self.args.len());
        encode_message(self.key(), &self.args, &mut buf);
        buf.freeze()
    }
}

/// Encode a message header followed by its argument bytes.
pub fn encode_message(key: MessageKey, args: &[u8], dst: &mut BytesMut) {
    dst.reserve(MESSAGE_HEADER_SIZE + args.len());
    dst.put_u8(key.feature_id);
    dst.put_u8(key.class_id);
    dst.put_u16_le(key.message_id);
    dst.put_slice(args);
}

/// Decode a message from a frame payload.
pub fn decode_message(src: &Bytes) -> Result<Message> {
    if src.len() < MESSAGE_HEADER_SIZE {
        return Err(FrameError::TruncatedMessage(src.len()));
    }

    Ok(Message {
        feature_id: src[0],
        class_id: src[1],
        message_id: u16::from_le_bytes([src[2], src[3]]),
        args: src.slice(MESSAGE_HEADER_SIZE..),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_args() {
        let key = MessageKey::new(1, 4, 0x0102);
        let message = Message::new(key, Bytes::from_static(b"\x01\x02\x03"));
        let wire = message.to_bytes();

        assert_eq!(wire.as_ref(), &[1, 4, 0x02, 0x01, 1, 2, 3]);
        assert_eq!(decode_message(&wire).unwrap(), message);
    }

    #[test]
    fn roundtrip_without_args() {
        let mut buf = BytesMut::new();
        encode_message(MessageKey::new(0, 4, 0), &[], &mut buf);
        let message = decode_message(&buf.freeze()).unwrap();

        assert_eq!(message.key(), MessageKey::new(0, 4, 0));
        assert!(message.args.is_empty());
    }

    #[test]
    fn message_id_extremes() {
        for id in [0u16, 1, 255, 256, u16::MAX] {
            let wire = Message::new(MessageKey::new(0x89, 0, id), Bytes::new()).to_bytes();
            assert_eq!(decode_message(&wire).unwrap().message_id, id);
        }
    }

    #[test]
    fn rejects_short_header() {
        for len in 0..MESSAGE_HEADER_SIZE {
            let buf = Bytes::from(vec![0u8; len]);
            assert_eq!(decode_message(&buf), Err(FrameError::TruncatedMessage(len)));
        }
    }

    #[test]
    fn matches_by_triple() {
        let message = Message::new(MessageKey::new(0, 5, 0), Bytes::new());
        assert!(message.matches(MessageKey::new(0, 5, 0)));
        assert!(!message.matches(MessageKey::new(0, 5, 1)));
        assert_eq!(message.key().to_string(), "0.5.0");
    }
}
