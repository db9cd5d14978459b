//! Shared fixtures for unit tests.

use std::sync::Arc;

use arnet_catalog::{embedded_documents, Catalog, MessageCatalog};
use arnet_frame::{decode_frame, encode_frame, encode_message, Frame, FrameType, MessageKey};
use bytes::{Bytes, BytesMut};

/// A feature-style test feature with correlated commands and list/map events.
pub(crate) const LAB: &str = r#"{
    "id": 160,
    "name": "lab",
    "classes": [
        {"id": 0, "name": "commands", "messages": [
            {"id": 0, "name": "refresh", "kind": "command",
             "expects": {"immediate": "lab.events.refreshed"}},
            {"id": 1, "name": "count", "kind": "command",
             "args": [{"name": "n", "type": "u8"}],
             "expects": {"immediate": "lab.events.counted"}},
            {"id": 2, "name": "poke", "kind": "command"},
            {"id": 3, "name": "nudge", "kind": "command", "buffer": "non_ack",
             "args": [{"name": "dx", "type": "i8"}]}
        ]},
        {"id": 1, "name": "events", "messages": [
            {"id": 0, "name": "refreshed", "kind": "event"},
            {"id": 1, "name": "counted", "kind": "event",
             "args": [{"name": "total", "type": "u8"}]},
            {"id": 2, "name": "reading", "kind": "event",
             "args": [{"name": "value", "type": "i16"}]},
            {"id": 3, "name": "sample", "kind": "event", "list_type": "list",
             "args": [{"name": "value", "type": "u8"}, {"name": "list_flags", "type": "u8"}]},
            {"id": 4, "name": "peer", "kind": "event", "list_type": "map", "map_key": "serial",
             "args": [{"name": "serial", "type": "string"}, {"name": "rssi", "type": "i8"},
                      {"name": "list_flags", "type": "u8"}]}
        ]}
    ]
}"#;

pub(crate) const REFRESH: MessageKey = MessageKey::new(160, 0, 0);
pub(crate) const COUNT: MessageKey = MessageKey::new(160, 0, 1);
pub(crate) const REFRESHED: MessageKey = MessageKey::new(160, 1, 0);
pub(crate) const COUNTED: MessageKey = MessageKey::new(160, 1, 1);
pub(crate) const READING: MessageKey = MessageKey::new(160, 1, 2);
pub(crate) const SAMPLE: MessageKey = MessageKey::new(160, 1, 3);
pub(crate) const PEER: MessageKey = MessageKey::new(160, 1, 4);

/// The embedded catalog plus the `lab` feature.
pub(crate) fn catalog() -> Arc<dyn MessageCatalog> {
    let mut docs: Vec<&str> = embedded_documents().map(|(_, doc)| doc).collect();
    docs.push(LAB);
    Arc::new(Catalog::from_documents(&docs).expect("test catalog should load"))
}

/// One frame carrying one message, as a datagram.
pub(crate) fn datagram(
    frame_type: FrameType,
    channel: u8,
    seq: u8,
    key: MessageKey,
    args: &[u8],
) -> Bytes {
    let mut payload = BytesMut::new();
    encode_message(key, args, &mut payload);
    let mut dst = BytesMut::new();
    encode_frame(frame_type, channel, seq, &payload, &mut dst).expect("frame should encode");
    dst.freeze()
}

/// An event on the acknowledged event channel.
pub(crate) fn event_with_ack(seq: u8, key: MessageKey, args: &[u8]) -> Bytes {
    datagram(
        FrameType::DataWithAck,
        arnet_frame::EVENT_WITH_ACK,
        seq,
        key,
        args,
    )
}

/// An event on the unacknowledged event channel.
pub(crate) fn event_no_ack(seq: u8, key: MessageKey, args: &[u8]) -> Bytes {
    datagram(FrameType::Data, arnet_frame::EVENT_NO_ACK, seq, key, args)
}

pub(crate) fn frame(datagram: &Bytes) -> Frame {
    decode_frame(datagram).expect("frame should decode").0
}

/// Message key of a data frame's payload.
pub(crate) fn message_key(datagram: &Bytes) -> MessageKey {
    arnet_frame::decode_message(&frame(datagram).payload)
        .expect("message should decode")
        .key()
}
