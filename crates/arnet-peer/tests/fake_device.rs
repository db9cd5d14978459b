use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arnet_catalog::{Catalog, MessageCatalog};
use arnet_frame::{
    decode_frame, decode_message, encode_frame, encode_message, FrameType, MessageKey,
    COMMAND_WITH_ACK, EVENT_ACK, EVENT_NO_ACK, EVENT_WITH_ACK,
};
use arnet_peer::{
    CloseReason, ConnectionConfig, Connector, Device, DeviceEvent, HandshakeCodec,
    NetworkConnector, PropertyValue,
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::codec::Framed;

const FLYING_STATE: MessageKey = MessageKey::new(1, 4, 1);
const TAKE_OFF: MessageKey = MessageKey::new(1, 0, 1);
const ALL_STATES: MessageKey = MessageKey::new(0, 4, 0);
const ALL_STATES_CHANGED: MessageKey = MessageKey::new(0, 5, 0);
const ALL_SETTINGS: MessageKey = MessageKey::new(0, 2, 0);
const ALL_SETTINGS_CHANGED: MessageKey = MessageKey::new(0, 3, 0);
const BATTERY: MessageKey = MessageKey::new(0, 5, 1);

/// The device end of a link: a UDP socket that knows where the controller is.
struct FakeDevice {
    socket: UdpSocket,
    controller: SocketAddr,
    seq: u8,
}

impl FakeDevice {
    async fn send(&mut self, frame_type: FrameType, channel: u8, key: MessageKey, args: &[u8]) {
        let mut payload = BytesMut::new();
        encode_message(key, args, &mut payload);
        let mut datagram = BytesMut::new();
        encode_frame(frame_type, channel, self.seq, &payload, &mut datagram)
            .expect("frame should encode");
        self.seq = self.seq.wrapping_add(1);
        self.socket
            .send_to(&datagram, self.controller)
            .await
            .expect("device should send");
    }

    async fn event_with_ack(&mut self, key: MessageKey, args: &[u8]) {
        self.send(FrameType::DataWithAck, EVENT_WITH_ACK, key, args)
            .await;
    }

    async fn event_no_ack(&mut self, key: MessageKey, args: &[u8]) {
        self.send(FrameType::Data, EVENT_NO_ACK, key, args).await;
    }

    async fn recv(&mut self) -> arnet_frame::Frame {
        let mut buf = vec![0u8; 2048];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), self.socket.recv_from(&mut buf))
            .await
            .expect("controller should send in time")
            .expect("device should receive");
        decode_frame(&Bytes::copy_from_slice(&buf[..n]))
            .expect("controller frame should decode")
            .0
    }

    async fn recv_command(&mut self) -> MessageKey {
        let frame = self.recv().await;
        assert_eq!(frame.frame_type, FrameType::Data);
        decode_message(&frame.payload)
            .expect("command should decode")
            .key()
    }

    async fn recv_ack(&mut self) -> u8 {
        let frame = self.recv().await;
        assert_eq!(frame.frame_type, FrameType::Ack);
        assert_eq!(frame.channel, EVENT_ACK);
        frame.payload[0]
    }
}

/// Accept one handshake and return the device end of the UDP link.
async fn serve_handshake(listener: TcpListener) -> FakeDevice {
    let (stream, peer) = listener.accept().await.expect("device should accept");
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("device UDP should bind");
    let c2d_port = socket.local_addr().expect("device UDP addr").port();

    let mut framed = Framed::new(stream, HandshakeCodec::default());
    let request = framed
        .next()
        .await
        .expect("controller should send a request")
        .expect("request should decode");
    assert_eq!(request["controllerType"], json!("arnet"));
    let d2c_port = request["d2c_port"]
        .as_u64()
        .expect("request should carry d2c_port") as u16;

    framed
        .send(json!({"status": 0, "c2d_port": c2d_port, "arstream2_client_stream_port": 55004}))
        .await
        .expect("device should answer");

    FakeDevice {
        socket,
        controller: SocketAddr::new(peer.ip(), d2c_port),
        seq: 0,
    }
}

fn catalog() -> Arc<dyn MessageCatalog> {
    Arc::new(Catalog::embedded().expect("embedded catalog should load"))
}

async fn next_event(device: &mut Device) -> DeviceEvent {
    tokio::time::timeout(Duration::from_secs(5), device.next_event())
        .await
        .expect("device event should arrive in time")
        .expect("device stream should be open")
}

#[tokio::test]
async fn handshake_bootstrap_and_command_over_localhost() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let port = listener.local_addr().expect("listener addr").port();
    let server = tokio::spawn(serve_handshake(listener));

    let connector = NetworkConnector::new("127.0.0.1", port, catalog());
    let (handle, events) = connector.connect().await.expect("connect should succeed");
    let mut remote = server.await.expect("handshake task should finish");
    let mut device = Device::new(connector.uid(), handle, events);

    // First ardrone3 event: the controller asks for the full state.
    remote.event_no_ack(FLYING_STATE, &2i32.to_le_bytes()).await;
    assert!(matches!(next_event(&mut device).await, DeviceEvent::Connected));
    assert!(matches!(
        next_event(&mut device).await,
        DeviceEvent::FeatureAttached { feature_id: 1, .. }
    ));
    match next_event(&mut device).await {
        DeviceEvent::PropertyChanged { change, .. } => {
            assert_eq!(change.property, "PilotingState.FlyingState");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(next_event(&mut device).await, DeviceEvent::Message(_)));

    assert_eq!(remote.recv_command().await, ALL_STATES);
    remote.event_with_ack(BATTERY, &[87]).await;
    assert_eq!(remote.recv_ack().await, 1);
    remote.event_with_ack(ALL_STATES_CHANGED, &[]).await;
    assert_eq!(remote.recv_ack().await, 2);
    assert_eq!(remote.recv_command().await, ALL_SETTINGS);
    remote.event_with_ack(ALL_SETTINGS_CHANGED, &[]).await;
    assert_eq!(remote.recv_ack().await, 3);

    // The battery event reached the device; the terminators did not.
    assert!(matches!(
        next_event(&mut device).await,
        DeviceEvent::FeatureAttached { feature_id: 0, .. }
    ));
    match next_event(&mut device).await {
        DeviceEvent::PropertyChanged { change, .. } => {
            assert_eq!(change.property, "CommonState.BatteryState");
            assert_eq!(
                change.value,
                PropertyValue::Scalar(json!({"percent": 87}).as_object().unwrap().clone())
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(matches!(next_event(&mut device).await, DeviceEvent::Message(_)));

    // A command without a terminator resolves as soon as it is sent.
    let batch = device
        .send_command("ardrone3.Piloting.TakeOff", serde_json::Value::Null)
        .await
        .expect("take off should be sent");
    assert!(batch.is_empty());
    let frame = remote.recv().await;
    assert_eq!(frame.channel, COMMAND_WITH_ACK);
    assert_eq!(decode_message(&frame.payload).unwrap().key(), TAKE_OFF);

    let snapshot = serde_json::to_value(device.snapshot()).unwrap();
    assert_eq!(
        snapshot["features"]["ardrone3"]["PilotingState.FlyingState"],
        json!({"state": "hovering"})
    );

    device.close();
    loop {
        if let DeviceEvent::Disconnected(reason) = next_event(&mut device).await {
            assert_eq!(reason, CloseReason::Requested);
            break;
        }
    }
}

#[tokio::test]
async fn silent_device_hits_keepalive() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let port = listener.local_addr().expect("listener addr").port();
    let server = tokio::spawn(serve_handshake(listener));

    let connector = NetworkConnector::new("127.0.0.1", port, catalog()).with_connection_config(
        ConnectionConfig {
            keepalive: Duration::from_millis(200),
        },
    );
    let (handle, _events) = connector.connect().await.expect("connect should succeed");
    let _remote = server.await.expect("handshake task should finish");

    let reason = tokio::time::timeout(Duration::from_secs(5), handle.closed())
        .await
        .expect("keepalive should fire");
    assert_eq!(reason, CloseReason::KeepaliveTimeout);
}
