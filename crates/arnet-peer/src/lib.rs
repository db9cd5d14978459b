//! Connection engine for ARSDK devices.
//!
//! Sits on top of a [`DatagramTransport`](arnet_transport::DatagramTransport)
//! and a [`MessageCatalog`](arnet_catalog::MessageCatalog):
//! - [`Session`] is the protocol state machine (acks, pongs, command
//!   correlation) with no I/O of its own.
//! - [`spawn_connection`] drives a session over a transport in a tokio task,
//!   with a keepalive, and hands back a [`ConnectionHandle`] and an event
//!   stream.
//! - [`Device`] rebuilds per-feature property state from that stream.
//! - [`NetworkConnector`] performs the TCP handshake and opens the UDP link;
//!   [`DeviceManager`] keeps devices connected.

mod ack;
pub mod config;
pub mod connection;
pub mod connector;
pub mod device;
pub mod error;
pub mod feature;
pub mod handshake;
pub mod manager;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::{ConnectionConfig, ManagerConfig};
pub use connection::{
    spawn_connection, CloseReason, CommandResponse, ConnectionEvent, ConnectionEvents,
    ConnectionHandle, ConnectionState,
};
pub use connector::{Connector, NetworkConnector, DEFAULT_HOST, DEFAULT_PORT};
pub use device::{Device, DeviceEvent, DeviceSnapshot};
pub use error::{ConnectionError, Result};
pub use feature::{
    reassemble, DroneManager, Feature, FeatureKind, PropertyChange, PropertyValue, ARDRONE3,
    DRONE_MANAGER, SKYCONTROLLER,
};
pub use handshake::{handshake, HandshakeCodec, HandshakeConfig, HandshakeRequest, HandshakeResponse};
pub use manager::{AttachOptions, DeviceManager, ManagerEvent, ManagerEvents};
pub use session::{Command, CommandResult, ResolvedMessage, Session, SessionEvent, SessionStats};
