use std::future::Future;
use std::io;

use bytes::Bytes;

/// A bidirectional datagram link to one remote device.
///
/// This is the fundamental I/O seam of arnet: the connection engine owns
/// exactly one transport and never touches sockets directly. `recv` must be
/// cancel-safe because the engine polls it inside `tokio::select!`.
pub trait DatagramTransport: Send + 'static {
    /// Send one datagram to the remote device.
    fn send(&mut self, datagram: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive the next datagram.
    ///
    /// Returns `Ok(None)` once the transport is closed for good.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<Bytes>>> + Send;

    /// Human-readable description of the remote end, for logs.
    fn remote(&self) -> String;
}
