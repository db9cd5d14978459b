/// Errors that can occur during frame and message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer bytes than a frame header.
    #[error("invalid frame size ({0} bytes, need at least 7)")]
    InvalidFrameSize(usize),

    /// The header's length field is smaller than the header itself.
    #[error("invalid frame length field ({0}, need at least 7)")]
    InvalidFrameLength(u32),

    /// The header's length field runs past the end of the datagram.
    #[error("truncated frame (declared {declared} bytes, {available} available)")]
    TruncatedFrame { declared: usize, available: usize },

    /// Fewer bytes than a message header.
    #[error("truncated message ({0} bytes, need at least 4)")]
    TruncatedMessage(usize),

    /// The payload cannot be described by the u32 length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
