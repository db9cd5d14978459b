use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use arnet_catalog::MessageCatalog;
use arnet_transport::{TransportError, UdpTransport};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::connection::{spawn_connection, ConnectionEvents, ConnectionHandle};
use crate::error::Result;
use crate::handshake::{handshake, HandshakeConfig, HandshakeRequest};

/// Address of a drone or remote on its own access point.
pub const DEFAULT_HOST: &str = "192.168.53.1";
/// TCP port of the connection handshake.
pub const DEFAULT_PORT: u16 = 44444;

/// Something that can open connections to one device, repeatedly.
pub trait Connector: Send + Sync + 'static {
    /// Stable identifier of the device this connector reaches.
    fn uid(&self) -> &str;

    /// Open a new connection.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<(ConnectionHandle, ConnectionEvents)>> + Send;
}

/// Connects over the network: TCP handshake, then UDP.
#[derive(Clone)]
pub struct NetworkConnector {
    host: String,
    port: u16,
    uid: String,
    catalog: Arc<dyn MessageCatalog>,
    handshake: HandshakeConfig,
    connection: ConnectionConfig,
}

impl NetworkConnector {
    pub fn new(host: impl Into<String>, port: u16, catalog: Arc<dyn MessageCatalog>) -> Self {
        let host = host.into();
        Self {
            uid: format!("arnet://{host}:{port}"),
            host,
            port,
            catalog,
            handshake: HandshakeConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }

    /// Connector for the default device address.
    pub fn default_device(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, catalog)
    }

    pub fn with_handshake_config(mut self, config: HandshakeConfig) -> Self {
        self.handshake = config;
        self
    }

    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let target = format!("{}:{}", self.host, self.port);
        let mut addrs = lookup_host(target.as_str()).await.map_err(TransportError::Io)?;
        addrs.next().ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{target} did not resolve to an address"),
            ))
            .into()
        })
    }

    async fn open(&self) -> Result<(ConnectionHandle, ConnectionEvents)> {
        let remote = self.resolve().await?;
        let stream = TcpStream::connect(remote)
            .await
            .map_err(|source| TransportError::Connect {
                addr: remote,
                source,
            })?;

        let unspecified = match remote.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        let socket = UdpTransport::bind(SocketAddr::new(unspecified, 0)).await?;
        let d2c_port = socket.local_addr().map_err(TransportError::Io)?.port();

        // The TCP stream is dropped (closed) when the handshake returns; the
        // UDP socket is dropped with it on failure.
        let request = HandshakeRequest::new(&self.handshake, d2c_port);
        let response = handshake(stream, &request, &self.handshake).await?;

        let c2d = SocketAddr::new(remote.ip(), response.c2d_port);
        debug!(uid = %self.uid, d2c_port, c2d = %c2d, "handshake complete");
        let transport = UdpTransport::new(socket, c2d);
        info!(uid = %self.uid, "connection established");
        Ok(spawn_connection(
            transport,
            Arc::clone(&self.catalog),
            self.connection.clone(),
        ))
    }
}

impl fmt::Debug for NetworkConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConnector")
            .field("uid", &self.uid)
            .field("handshake", &self.handshake)
            .field("connection", &self.connection)
            .finish()
    }
}

impl Connector for NetworkConnector {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn connect(
        &self,
    ) -> impl Future<Output = Result<(ConnectionHandle, ConnectionEvents)>> + Send {
        self.open()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::*;
    use crate::error::ConnectionError;
    use crate::testing;

    #[test]
    fn uid_names_host_and_port() {
        let connector = NetworkConnector::default_device(testing::catalog());
        assert_eq!(connector.uid(), "arnet://192.168.53.1:44444");
        assert_eq!(connector.port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn refused_tcp_is_a_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let connector = NetworkConnector::new("127.0.0.1", port, testing::catalog());
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Transport(TransportError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn handshake_timeout_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _silent = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let connector = NetworkConnector::new("127.0.0.1", port, testing::catalog())
            .with_handshake_config(HandshakeConfig {
                timeout: Duration::from_millis(100),
                ..HandshakeConfig::default()
            });
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(_)));
    }
}
