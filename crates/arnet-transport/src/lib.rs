//! Datagram transport abstraction for ARSDK device links.
//!
//! Provides a unified interface over the ways a controller can reach a device:
//! - UDP sockets (the real device link)
//! - In-memory pairs (scripted devices, tests)
//!
//! This is the lowest layer of arnet. Everything else builds on top of the
//! [`DatagramTransport`] trait provided here.

pub mod error;
pub mod memory;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::DatagramTransport;
pub use udp::UdpTransport;
