//! ARSDK frame and message codecs with per-channel sequencing.
//!
//! Every datagram exchanged with a device carries one or more frames:
//! - A 1-byte frame type (ack, data, low-latency data, data-with-ack)
//! - A 1-byte channel (buffer) ID
//! - A 1-byte per-channel sequence number
//! - A 4-byte little-endian total length, header included
//!
//! Data frames wrap a message: feature ID, class ID and a little-endian
//! message ID followed by catalog-encoded arguments.

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;
pub mod sequence;

pub use channel::{
    ack_channel, channel_name, ACK_OFFSET, COMMAND_ACK, COMMAND_HIGH_PRIORITY, COMMAND_NO_ACK,
    COMMAND_WITH_ACK, EVENT_ACK, EVENT_NO_ACK, EVENT_WITH_ACK, HIGH_PRIORITY_ACK, PING, PONG,
};
pub use codec::{decode_frame, encode_frame, Frame, FrameType, Frames, HEADER_SIZE, MAX_PAYLOAD};
pub use error::{FrameError, Result};
pub use message::{decode_message, encode_message, Message, MessageKey, MESSAGE_HEADER_SIZE};
pub use sequence::SequenceCounters;

/// Space-separated hex rendering used by raw traffic traces.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
