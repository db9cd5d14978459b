//! Link-level replies the controller owes the device.

use arnet_frame::{ack_channel, encode_frame, Frame, FrameType, SequenceCounters, PONG};
use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Acknowledge a frame received on an acknowledged channel.
///
/// The ack is an ACK frame on `channel + 128` whose single payload byte is
/// the received sequence number. Its own sequence number comes from the ack
/// channel's counter.
pub(crate) fn ack_for(frame: &Frame, counters: &mut SequenceCounters) -> Result<Bytes> {
    let channel = ack_channel(frame.channel);
    let seq = counters.next(channel);
    let mut dst = BytesMut::with_capacity(8);
    encode_frame(FrameType::Ack, channel, seq, &[frame.seq], &mut dst)?;
    Ok(dst.freeze())
}

/// Answer a ping: same frame type, sequence number and payload, on the pong
/// channel.
pub(crate) fn pong_for(frame: &Frame) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_frame(frame.frame_type, PONG, frame.seq, &frame.payload, &mut dst)?;
    Ok(dst.freeze())
}
