use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::error::{Result, TransportError};
use crate::traits::DatagramTransport;

/// Largest datagram we accept from a device.
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// UDP transport.
///
/// The local socket is bound first (its port is advertised to the device as
/// the device-to-controller port during the handshake), then pointed at the
/// device's controller-to-device port once the handshake answers.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    buf: Box<[u8]>,
}

impl UdpTransport {
    /// Bind a UDP socket on `local`. Use port 0 for an ephemeral port.
    pub async fn bind(local: SocketAddr) -> Result<UdpSocket> {
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                addr: local,
                source,
            })?;
        info!(local = ?socket.local_addr().ok(), "bound device-to-controller socket");
        Ok(socket)
    }

    /// Wrap a bound socket, sending to `remote`.
    pub fn new(socket: UdpSocket, remote: SocketAddr) -> Self {
        Self {
            socket,
            remote,
            buf: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
        }
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Into::into)
    }

    /// Address datagrams are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl DatagramTransport for UdpTransport {
    async fn send(&mut self, datagram: Bytes) -> io::Result<()> {
        let sent = self.socket.send_to(&datagram, self.remote).await?;
        if sent != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short datagram write ({sent} of {} bytes)", datagram.len()),
            ));
        }
        Ok(())
    }

    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            let (len, from) = self.socket.recv_from(&mut self.buf).await?;
            // The device may answer from any port, but only from its own host.
            if from.ip() != self.remote.ip() {
                trace!(%from, expected = %self.remote, len, "dropping datagram from unexpected host");
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(&self.buf[..len])));
        }
    }

    fn remote(&self) -> String {
        self.remote.to_string()
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local", &self.socket.local_addr().ok())
            .field("remote", &self.remote)
            .finish()
    }
}
