//! JSON connection handshake over the device's TCP discovery port.
//!
//! The controller announces its name and the UDP port it listens on
//! (`d2c_port`); the device answers with a status and the UDP port it
//! listens on (`c2d_port`). Either side may terminate its document with a
//! NUL byte.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::debug;

use crate::error::{ConnectionError, Result};

/// Controller-side handshake settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Bound on the whole exchange.
    pub timeout: Duration,
    pub controller_type: String,
    pub controller_name: String,
    /// Largest handshake document accepted from the device, in bytes.
    pub max_handshake_payload: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            controller_type: "arnet".to_string(),
            controller_name: std::env::var("HOSTNAME")
                .ok()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "arnet".to_string()),
            max_handshake_payload: 16 * 1024,
        }
    }
}

/// Sent by the controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRequest {
    #[serde(rename = "controllerType")]
    pub controller_type: String,
    #[serde(rename = "controllerName")]
    pub controller_name: String,
    /// UDP port the controller receives on.
    pub d2c_port: u16,
}

impl HandshakeRequest {
    pub fn new(config: &HandshakeConfig, d2c_port: u16) -> Self {
        Self {
            controller_type: config.controller_type.clone(),
            controller_name: config.controller_name.clone(),
            d2c_port,
        }
    }
}

/// Sent by the device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandshakeResponse {
    /// Zero on success.
    pub status: i32,
    /// UDP port the device receives on.
    #[serde(default)]
    pub c2d_port: u16,
    /// Device-specific fields (stream ports, qos mode, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One JSON document per frame, optionally NUL-terminated.
#[derive(Debug, Clone)]
pub struct HandshakeCodec {
    max_length: usize,
}

impl HandshakeCodec {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for HandshakeCodec {
    fn default() -> Self {
        Self::new(HandshakeConfig::default().max_handshake_payload)
    }
}

impl Decoder for HandshakeCodec {
    type Item = Value;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        let skip = src
            .iter()
            .take_while(|b| **b == 0 || b.is_ascii_whitespace())
            .count();
        src.advance(skip);
        if src.is_empty() {
            return Ok(None);
        }

        let mut documents = serde_json::Deserializer::from_slice(src).into_iter::<Value>();
        match documents.next() {
            Some(Ok(value)) => {
                let consumed = documents.byte_offset();
                src.advance(consumed);
                if src.first() == Some(&0) {
                    src.advance(1);
                }
                Ok(Some(value))
            }
            Some(Err(err)) if err.is_eof() => {
                if src.len() > self.max_length {
                    return Err(ConnectionError::HandshakeFailed(format!(
                        "handshake document exceeds {} bytes",
                        self.max_length
                    )));
                }
                Ok(None)
            }
            Some(Err(err)) => Err(err.into()),
            None => Ok(None),
        }
    }
}

impl<T: Serialize> Encoder<T> for HandshakeCodec {
    type Error = ConnectionError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        let document = serde_json::to_vec(&item)?;
        dst.reserve(document.len() + 1);
        dst.put_slice(&document);
        dst.put_u8(0);
        Ok(())
    }
}

/// Run the controller side of the handshake on an open stream.
///
/// Fails with [`ConnectionError::Timeout`] if the device does not answer in
/// time and [`ConnectionError::HandshakeFailed`] if it answers with a
/// non-zero status or closes the stream.
pub async fn handshake<S>(
    stream: S,
    request: &HandshakeRequest,
    config: &HandshakeConfig,
) -> Result<HandshakeResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, HandshakeCodec::new(config.max_handshake_payload));

    let exchange = async {
        framed.send(request).await?;
        match framed.next().await {
            Some(document) => Ok(serde_json::from_value::<HandshakeResponse>(document?)?),
            None => Err(ConnectionError::HandshakeFailed(
                "device closed the stream before answering".to_string(),
            )),
        }
    };
    let response = tokio::time::timeout(config.timeout, exchange)
        .await
        .map_err(|_| ConnectionError::Timeout(config.timeout))??;

    if response.status != 0 {
        return Err(ConnectionError::HandshakeFailed(format!(
            "device refused connection (status {})",
            response.status
        )));
    }
    debug!(c2d_port = response.c2d_port, "handshake accepted");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn request() -> HandshakeRequest {
        HandshakeRequest {
            controller_type: "arnet".to_string(),
            controller_name: "bench".to_string(),
            d2c_port: 43210,
        }
    }

    fn config() -> HandshakeConfig {
        HandshakeConfig {
            timeout: Duration::from_secs(1),
            controller_name: "bench".to_string(),
            ..HandshakeConfig::default()
        }
    }

    #[test]
    fn decodes_terminated_and_bare_documents() {
        let mut codec = HandshakeCodec::default();
        let mut buf = BytesMut::from(&b"{\"status\":0}\0{\"status\":"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"status": 0})));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"1}");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(json!({"status": 1})));
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_document_rejected() {
        let mut codec = HandshakeCodec::new(8);
        let mut buf = BytesMut::from(&b"{\"status\": 0, \"pad\": \"xx"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ConnectionError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn garbage_rejected() {
        let mut codec = HandshakeCodec::default();
        let mut buf = BytesMut::from(&b"not json"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(ConnectionError::Json(_))));
    }

    #[test]
    fn request_uses_device_key_names() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["controllerType"], json!("arnet"));
        assert_eq!(value["controllerName"], json!("bench"));
        assert_eq!(value["d2c_port"], json!(43210));
        assert!(value.get("controller_type").is_none());
        assert!(value.get("controller_name").is_none());
    }

    #[test]
    fn encodes_with_terminator() {
        let mut codec = HandshakeCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&request(), &mut buf).unwrap();
        assert_eq!(buf.last(), Some(&0));
        let sent: Value = serde_json::from_slice(&buf[..buf.len() - 1]).unwrap();
        assert_eq!(
            sent,
            json!({"controllerType": "arnet", "controllerName": "bench", "d2c_port": 43210})
        );
    }

    #[tokio::test]
    async fn accepted_handshake_returns_ports() {
        let (client, mut device) = duplex(1024);
        let device = tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let n = device.read(&mut buf).await.unwrap();
            let sent: Value = serde_json::from_slice(&buf[..n - 1]).unwrap();
            assert_eq!(sent["d2c_port"], json!(43210));
            device
                .write_all(b"{\"status\": 0, \"c2d_port\": 54321, \"qos_mode\": 0}\0")
                .await
                .unwrap();
        });

        let response = handshake(client, &request(), &config())
            .await
            .expect("handshake should succeed");
        assert_eq!(response.c2d_port, 54321);
        assert_eq!(response.extra["qos_mode"], json!(0));
        device.await.unwrap();
    }

    #[tokio::test]
    async fn refused_handshake_fails() {
        let (client, mut device) = duplex(1024);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 256];
            let _ = device.read(&mut buf).await;
            let _ = device.write_all(b"{\"status\": -1}").await;
        });

        let err = handshake(client, &request(), &config()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn closed_stream_fails() {
        let (client, device) = duplex(1024);
        drop(device);
        let err = handshake(client, &request(), &config()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::HandshakeFailed(_) | ConnectionError::Io(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let (client, _device) = duplex(1024);
        let err = handshake(client, &request(), &config()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout(_)));
    }
}
