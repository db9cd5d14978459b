use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: type (1) + channel (1) + sequence (1) + total length (4) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Largest payload the u32 total-length field can describe.
pub const MAX_PAYLOAD: usize = u32::MAX as usize - HEADER_SIZE;

/// Frame type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Acknowledgement of a previously received frame.
    Ack,
    /// Plain data.
    Data,
    /// Low-latency data (video, high-rate piloting).
    LowLatencyData,
    /// Data the receiver must acknowledge.
    DataWithAck,
    /// Any other type byte, preserved verbatim.
    Other(u8),
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => FrameType::Ack,
            0x02 => FrameType::Data,
            0x03 => FrameType::LowLatencyData,
            0x04 => FrameType::DataWithAck,
            other => FrameType::Other(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        match value {
            FrameType::Ack => 0x01,
            FrameType::Data => 0x02,
            FrameType::LowLatencyData => 0x03,
            FrameType::DataWithAck => 0x04,
            FrameType::Other(other) => other,
        }
    }
}

/// A transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type.
    pub frame_type: FrameType,
    /// The channel (buffer) this frame belongs to.
    pub channel: u8,
    /// Per-channel sequence number.
    pub seq: u8,
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, channel: u8, seq: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            channel,
            seq,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.frame_type, self.channel, self.seq, &self.payload, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬───────────┬──────────┬────────────────┬──────────────────────┐
/// │ Type (1B)│ Channel   │ Seq (1B) │ Total length   │ Payload              │
/// │          │ (1B)      │          │ (4B LE, incl.  │ (length - 7 bytes)   │
/// │          │           │          │ header)        │                      │
/// └──────────┴───────────┴──────────┴────────────────┴──────────────────────┘
/// ```
pub fn encode_frame(
    frame_type: FrameType,
    channel: u8,
    seq: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.into());
    dst.put_u8(channel);
    dst.put_u8(seq);
    dst.put_u32_le((HEADER_SIZE + payload.len()) as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode the frame at the start of `src`.
///
/// Returns the frame and the number of bytes it occupied. Trailing bytes past
/// the declared length are left for the caller (see [`Frames`]).
pub fn decode_frame(src: &Bytes) -> Result<(Frame, usize)> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::InvalidFrameSize(src.len()));
    }

    let declared = u32::from_le_bytes([src[3], src[4], src[5], src[6]]);
    if (declared as usize) < HEADER_SIZE {
        return Err(FrameError::InvalidFrameLength(declared));
    }

    let total = declared as usize;
    if total > src.len() {
        return Err(FrameError::TruncatedFrame {
            declared: total,
            available: src.len(),
        });
    }

    let frame = Frame {
        frame_type: FrameType::from(src[0]),
        channel: src[1],
        seq: src[2],
        payload: src.slice(HEADER_SIZE..total),
    };
    Ok((frame, total))
}

/// Iterator over the frames packed into one datagram.
///
/// Yields an error at most once; iteration stops after a malformed frame.
#[derive(Debug, Clone)]
pub struct Frames {
    rest: Bytes,
    failed: bool,
}

impl Frames {
    /// Iterate the frames of a datagram.
    pub fn new(datagram: Bytes) -> Self {
        Self {
            rest: datagram,
            failed: false,
        }
    }
}

impl Iterator for Frames {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        match decode_frame(&self.rest) {
            Ok((frame, used)) => {
                let _ = self.rest.split_to(used);
                Some(Ok(frame))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
