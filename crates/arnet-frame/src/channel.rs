//! Built-in channel (buffer) IDs.
//!
//! These values must match the device firmware bit for bit. Host-to-device
//! channels live below 64, device-to-host channels just below 128, and every
//! acknowledged channel has a matching ack channel at `id + ACK_OFFSET`.

/// Keepalive ping from the device.
pub const PING: u8 = 0;

/// Keepalive pong back to the device.
pub const PONG: u8 = 1;

/// Commands the device does not acknowledge.
pub const COMMAND_NO_ACK: u8 = 10;

/// Commands the device acknowledges.
pub const COMMAND_WITH_ACK: u8 = 11;

/// High-priority commands (emergency, piloting).
pub const COMMAND_HIGH_PRIORITY: u8 = 12;

/// Events the device expects us to acknowledge.
pub const EVENT_WITH_ACK: u8 = 126;

/// Events that need no acknowledgement (telemetry).
pub const EVENT_NO_ACK: u8 = 127;

/// Distance between a channel and its acknowledgement channel.
pub const ACK_OFFSET: u8 = 128;

/// Acks for [`COMMAND_WITH_ACK`], sent by the device.
pub const COMMAND_ACK: u8 = COMMAND_WITH_ACK + ACK_OFFSET;

/// Acks for [`COMMAND_HIGH_PRIORITY`], sent by the device.
pub const HIGH_PRIORITY_ACK: u8 = COMMAND_HIGH_PRIORITY + ACK_OFFSET;

/// Acks for [`EVENT_WITH_ACK`], sent by us.
pub const EVENT_ACK: u8 = EVENT_WITH_ACK + ACK_OFFSET;

/// Acknowledgement channel for a base channel.
pub fn ack_channel(base: u8) -> u8 {
    base.wrapping_add(ACK_OFFSET)
}

/// Returns true if the channel carries acknowledgements.
pub fn is_ack_channel(id: u8) -> bool {
    id >= ACK_OFFSET
}

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u8) -> &'static str {
    match id {
        PING => "PING",
        PONG => "PONG",
        COMMAND_NO_ACK => "COMMAND_NO_ACK",
        COMMAND_WITH_ACK => "COMMAND_WITH_ACK",
        COMMAND_HIGH_PRIORITY => "COMMAND_HIGH_PRIORITY",
        EVENT_WITH_ACK => "EVENT_WITH_ACK",
        EVENT_NO_ACK => "EVENT_NO_ACK",
        COMMAND_ACK => "COMMAND_ACK",
        HIGH_PRIORITY_ACK => "HIGH_PRIORITY_ACK",
        EVENT_ACK => "EVENT_ACK",
        _ if is_ack_channel(id) => "ACK",
        _ => "UNKNOWN",
    }
}
