use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::DatagramTransport;

/// In-process datagram transport.
///
/// Created in connected pairs; whatever one end sends the other receives, in
/// order. Dropping one end closes the other (`recv` yields `Ok(None)`).
/// Used to drive the connection engine against a scripted device.
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryTransport {
    /// Create a connected pair `(controller, device)`.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                name: "memory:device".to_string(),
                tx: a_tx,
                rx: a_rx,
            },
            Self {
                name: "memory:controller".to_string(),
                tx: b_tx,
                rx: b_rx,
            },
        )
    }

    /// Receive without waiting. `None` if nothing is queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Send without waiting.
    pub fn send_now(&self, datagram: impl Into<Bytes>) -> io::Result<()> {
        self.tx
            .send(datagram.into())
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "peer transport dropped"))
    }
}

impl DatagramTransport for MemoryTransport {
    async fn send(&mut self, datagram: Bytes) -> io::Result<()> {
        self.send_now(datagram)
    }

    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }

    fn remote(&self) -> String {
        self.name.clone()
    }
}
