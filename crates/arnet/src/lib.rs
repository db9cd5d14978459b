//! Controller-side ARSDK protocol engine for drones and remotes.
//!
//! arnet talks to ARSDK devices over UDP: it frames and sequences messages,
//! acknowledges device events, answers pings, correlates commands with the
//! events that complete them, and rebuilds each feature's properties.
//!
//! # Crate Structure
//!
//! - [`transport`]: datagram transport abstraction (UDP, in-memory pairs)
//! - [`frame`]: frame and message codecs, channels, sequence counters
//! - [`catalog`]: message catalog and argument codecs
//! - [`peer`]: connections, devices and supervision (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use arnet_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use arnet_frame::*;
}

/// Re-export catalog types.
pub mod catalog {
    pub use arnet_catalog::*;
}

/// Re-export connection types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use arnet_peer::*;
}
