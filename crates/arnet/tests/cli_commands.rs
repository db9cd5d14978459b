#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, UdpSocket};
use std::process::Command;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arnet_frame::{
    decode_frame, decode_message, encode_frame, encode_message, FrameType, MessageKey,
    EVENT_NO_ACK, EVENT_WITH_ACK,
};
use bytes::{Bytes, BytesMut};

const ALL_STATES: MessageKey = MessageKey::new(0, 4, 0);
const ALL_STATES_CHANGED: MessageKey = MessageKey::new(0, 5, 0);
const BATTERY: MessageKey = MessageKey::new(0, 5, 1);

fn arnet() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_arnet"));
    command
        .env_remove("ARNET_CATALOG")
        .env_remove("ARNET_DEBUG")
        .arg("--log-level")
        .arg("error");
    command
}

fn datagram(frame_type: FrameType, channel: u8, seq: u8, key: MessageKey, args: &[u8]) -> Vec<u8> {
    let mut payload = BytesMut::new();
    encode_message(key, args, &mut payload);
    let mut out = BytesMut::new();
    encode_frame(frame_type, channel, seq, &payload, &mut out).expect("frame should encode");
    out.to_vec()
}

/// Serve one handshake on a fresh port, then run `script` against the
/// controller's UDP address.
fn fake_device<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(&UdpSocket, SocketAddr) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("listener addr").port();

    let device = thread::spawn(move || {
        let (mut stream, peer) = listener.accept().expect("device should accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout should be settable");
        let udp = UdpSocket::bind("127.0.0.1:0").expect("device UDP should bind");
        udp.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout should be settable");

        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while stream.read(&mut byte).expect("request should arrive") == 1 && byte[0] != 0 {
            request.push(byte[0]);
        }
        let request: serde_json::Value =
            serde_json::from_slice(&request).expect("request should be JSON");
        let d2c_port = request["d2c_port"].as_u64().expect("d2c_port") as u16;

        let response = format!(
            "{{\"status\": 0, \"c2d_port\": {}}}\0",
            udp.local_addr().expect("device UDP addr").port()
        );
        stream
            .write_all(response.as_bytes())
            .expect("response should be written");

        script(&udp, SocketAddr::new(peer.ip(), d2c_port));
    });
    (port, device)
}

fn recv_frame(udp: &UdpSocket) -> arnet_frame::Frame {
    let mut buf = [0u8; 2048];
    let (n, _) = udp.recv_from(&mut buf).expect("controller should send");
    decode_frame(&Bytes::copy_from_slice(&buf[..n]))
        .expect("frame should decode")
        .0
}

#[test]
fn version_prints_package_version() {
    let output = arnet().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("arnet {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn catalog_list_json_includes_commands_and_terminators() {
    let output = arnet()
        .args(["--format", "json", "catalog", "list", "--feature", "common"])
        .output()
        .expect("catalog list should run");
    assert!(output.status.success());

    let rows: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be JSON");
    let rows = rows.as_array().expect("output should be an array");
    let all_states = rows
        .iter()
        .find(|row| row["path"] == "common.Common.AllStates")
        .expect("AllStates should be listed");
    assert_eq!(all_states["terminator"], "common.CommonState.AllStatesChanged");
    assert!(rows
        .iter()
        .all(|row| row["path"].as_str().unwrap_or_default().starts_with("common.")));
}

#[test]
fn catalog_resolve_unknown_path_is_usage_error() {
    let output = arnet()
        .args(["catalog", "resolve", "common.Common.Nope"])
        .output()
        .expect("catalog resolve should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_rejects_unknown_path_before_connecting() {
    // Nothing listens here; the path check must fail first.
    let output = arnet()
        .args(["send", "127.0.0.1:9", "ardrone3.Piloting.Nope"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ardrone3.Piloting.Nope"));
}

#[test]
fn send_prints_response_batch() {
    let (port, device) = fake_device(|udp, controller| {
        let command = recv_frame(udp);
        assert_eq!(command.frame_type, FrameType::Data);
        assert_eq!(
            decode_message(&command.payload).expect("command").key(),
            ALL_STATES
        );

        let battery = datagram(FrameType::DataWithAck, EVENT_WITH_ACK, 0, BATTERY, &[64]);
        udp.send_to(&battery, controller).expect("battery should send");
        let done = datagram(FrameType::DataWithAck, EVENT_WITH_ACK, 1, ALL_STATES_CHANGED, &[]);
        udp.send_to(&done, controller).expect("terminator should send");

        for seq in 0..2u8 {
            let ack = recv_frame(udp);
            assert_eq!(ack.frame_type, FrameType::Ack);
            assert_eq!(ack.payload.as_ref(), &[seq]);
        }
    });

    let output = arnet()
        .args(["--format", "json", "send"])
        .arg(format!("127.0.0.1:{port}"))
        .arg("common.Common.AllStates")
        .output()
        .expect("send should run");
    device.join().expect("fake device should finish");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be JSON");
    assert_eq!(out["command"], "common.Common.AllStates");
    let response = out["response"].as_array().expect("response should be an array");
    assert_eq!(response.len(), 1);
    assert_eq!(response[0]["path"], "common.CommonState.BatteryStateChanged");
    assert_eq!(response[0]["params"]["percent"], 64);
}

#[test]
fn listen_stops_after_count() {
    let (port, device) = fake_device(|udp, controller| {
        let battery = datagram(FrameType::Data, EVENT_NO_ACK, 0, BATTERY, &[42]);
        udp.send_to(&battery, controller).expect("battery should send");
    });

    let output = arnet()
        .args(["--format", "json", "listen", "--messages-only", "--count", "1"])
        .arg(format!("127.0.0.1:{port}"))
        .output()
        .expect("listen should run");
    device.join().expect("fake device should finish");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let lines: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    let events: Vec<_> = lines
        .iter()
        .map(|line| line["event"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(events, vec!["connected", "feature", "message"]);
    assert_eq!(lines[2]["subject"], "common.CommonState.BatteryStateChanged");
    assert_eq!(lines[2]["detail"]["percent"], 42);
}
