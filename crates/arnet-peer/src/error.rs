use std::time::Duration;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] arnet_transport::TransportError),

    /// Frame or message codec error.
    #[error("frame error: {0}")]
    Frame(#[from] arnet_frame::FrameError),

    /// Catalog lookup or argument coding error.
    #[error("catalog error: {0}")]
    Catalog(#[from] arnet_catalog::CatalogError),

    /// Socket I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The device refused or garbled the handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No catalog message has this path.
    #[error("no catalog message named '{0}'")]
    DescriptorNotFound(String),

    /// The connection closed before the command resolved.
    #[error("connection closed")]
    ConnectionClosed,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A device with this uid is already supervised.
    #[error("device '{0}' is already attached")]
    AlreadyAttached(String),

    /// No supervised device has this uid.
    #[error("no attached device '{0}'")]
    UnknownDevice(String),

    /// Operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
