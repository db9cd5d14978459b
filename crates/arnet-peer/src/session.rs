//! Protocol state of one device link, free of I/O.
//!
//! A [`Session`] is fed inbound datagrams and outbound commands and produces
//! datagrams to transmit, completed command responses and events. The
//! connection driver owns one session and moves bytes between it and the
//! transport; tests drive it directly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use arnet_catalog::{MessageCatalog, MessageDescriptor, Params};
use arnet_frame::{
    channel, channel_name, decode_message, encode_frame, encode_message, hexdump, Frame,
    FrameType, Frames, Message, MessageKey, SequenceCounters,
};
use bytes::{Bytes, BytesMut};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::ack::{ack_for, pong_for};
use crate::error::{ConnectionError, Result};

/// Outcome of a command: the events that arrived before its terminator.
pub type CommandResult = Result<Vec<ResolvedMessage>>;

/// Where a command's outcome is delivered.
pub type Responder = oneshot::Sender<CommandResult>;

/// A received message matched to its catalog descriptor.
#[derive(Debug, Clone)]
pub struct ResolvedMessage {
    pub message: Message,
    pub descriptor: Arc<MessageDescriptor>,
    pub params: Params,
}

impl ResolvedMessage {
    /// Dotted catalog path of the message.
    pub fn path(&self) -> &str {
        &self.descriptor.path
    }

    pub fn key(&self) -> MessageKey {
        self.message.key()
    }
}

impl Serialize for ResolvedMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResolvedMessage", 5)?;
        state.serialize_field("path", self.path())?;
        state.serialize_field("feature_id", &self.message.feature_id)?;
        state.serialize_field("class_id", &self.message.class_id)?;
        state.serialize_field("message_id", &self.message.message_id)?;
        state.serialize_field("params", &self.params)?;
        state.end()
    }
}

/// A command resolved against the catalog with its arguments encoded.
#[derive(Debug, Clone)]
pub struct Command {
    pub descriptor: Arc<MessageDescriptor>,
    pub args: Bytes,
}

impl Command {
    /// Resolve `path` and encode `params`.
    pub fn prepare(catalog: &dyn MessageCatalog, path: &str, params: &Value) -> Result<Self> {
        let descriptor = catalog
            .resolve_path(path)
            .ok_or_else(|| ConnectionError::DescriptorNotFound(path.to_string()))?;
        let args = descriptor.encode(params)?;
        Ok(Self { descriptor, args })
    }
}

/// Something the session wants the application to know.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A resolved message that was not consumed as a command terminator.
    Message(ResolvedMessage),
    /// The device pinged us; the pong is already queued.
    Ping { seq: u8, payload: Bytes },
}

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub acks_sent: u64,
    pub device_acks: u64,
    pub commands_sent: u64,
}

struct Pending {
    command: Command,
    responder: Responder,
}

/// Per-link protocol state: sequence counters, the correlated command queue
/// and its response buffer.
pub struct Session {
    catalog: Arc<dyn MessageCatalog>,
    counters: SequenceCounters,
    /// Commands awaiting their terminator. Only the head has been sent.
    pending: VecDeque<Pending>,
    /// Events received while the head was in flight.
    buffer: Vec<ResolvedMessage>,
    transmits: VecDeque<Bytes>,
    completions: VecDeque<(Responder, CommandResult)>,
    events: VecDeque<SessionEvent>,
    stats: SessionStats,
}

impl Session {
    pub fn new(catalog: Arc<dyn MessageCatalog>) -> Self {
        Self {
            catalog,
            counters: SequenceCounters::new(),
            pending: VecDeque::new(),
            buffer: Vec::new(),
            transmits: VecDeque::new(),
            completions: VecDeque::new(),
            events: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    /// Queue a command.
    ///
    /// Commands without a terminator are sent at once and complete with an
    /// empty batch. Correlated commands are sent one at a time, in order;
    /// each waits for its terminator before the next goes out.
    pub fn send_command(&mut self, command: Command, responder: Responder) {
        if command.descriptor.terminator.is_none() {
            let result = self.transmit(&command).map(|()| Vec::new());
            self.completions.push_back((responder, result));
            return;
        }

        let idle = self.pending.is_empty();
        self.pending.push_back(Pending { command, responder });
        if idle {
            self.start_head();
        } else {
            trace!(queued = self.pending.len(), "command parked behind in-flight command");
        }
    }

    /// Process one inbound datagram.
    pub fn handle_datagram(&mut self, datagram: Bytes) {
        trace!(len = datagram.len(), hex = %hexdump(&datagram), "datagram received");
        for frame in Frames::new(datagram) {
            match frame {
                Ok(frame) => self.handle_frame(frame),
                Err(err) => {
                    self.stats.frames_dropped += 1;
                    warn!(error = %err, "dropping malformed frame");
                }
            }
        }
    }

    /// Next datagram to put on the wire.
    pub fn poll_transmit(&mut self) -> Option<Bytes> {
        self.transmits.pop_front()
    }

    /// Next event for the application.
    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Deliver every finished command outcome to its caller.
    ///
    /// Call after draining [`poll_transmit`](Self::poll_transmit) so callers
    /// never observe a response before the acknowledgement that preceded it
    /// went out.
    pub fn complete_ready(&mut self) {
        while let Some((responder, result)) = self.completions.pop_front() {
            if responder.send(result).is_err() {
                trace!("command caller went away before completion");
            }
        }
    }

    /// Fail every queued command with [`ConnectionError::ConnectionClosed`]
    /// and discard unsent traffic.
    pub fn close(&mut self) {
        self.complete_ready();
        for pending in self.pending.drain(..) {
            let _ = pending.responder.send(Err(ConnectionError::ConnectionClosed));
        }
        self.buffer.clear();
        self.transmits.clear();
    }

    /// Number of correlated commands queued, including the one in flight.
    pub fn queued_commands(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn handle_frame(&mut self, frame: Frame) {
        self.stats.frames_received += 1;
        match frame.channel {
            channel::PING => {
                match pong_for(&frame) {
                    Ok(pong) => self.transmits.push_back(pong),
                    Err(err) => warn!(error = %err, "failed to build pong"),
                }
                debug!(seq = frame.seq, "ping");
                self.events.push_back(SessionEvent::Ping {
                    seq: frame.seq,
                    payload: frame.payload,
                });
            }
            channel::EVENT_NO_ACK => {
                if let Some(message) = self.resolve(&frame) {
                    self.events.push_back(SessionEvent::Message(message));
                }
            }
            channel::EVENT_WITH_ACK => {
                // The ack is owed whatever the payload turns out to be.
                match ack_for(&frame, &mut self.counters) {
                    Ok(ack) => {
                        self.transmits.push_back(ack);
                        self.stats.acks_sent += 1;
                    }
                    Err(err) => warn!(error = %err, "failed to build ack"),
                }
                if let Some(message) = self.resolve(&frame) {
                    self.correlate(message);
                }
            }
            channel::COMMAND_ACK | channel::HIGH_PRIORITY_ACK => {
                self.stats.device_acks += 1;
                debug!(
                    channel = channel_name(frame.channel),
                    acked = frame.payload.first().copied(),
                    "device acknowledged command"
                );
            }
            other => {
                self.stats.frames_dropped += 1;
                debug!(
                    channel = other,
                    name = channel_name(other),
                    frame_type = ?frame.frame_type,
                    "dropping frame on unhandled channel"
                );
            }
        }
    }

    fn resolve(&mut self, frame: &Frame) -> Option<ResolvedMessage> {
        let message = match decode_message(&frame.payload) {
            Ok(message) => message,
            Err(err) => {
                self.stats.frames_dropped += 1;
                warn!(error = %err, channel = frame.channel, "dropping malformed message");
                return None;
            }
        };
        let Some(descriptor) = self.catalog.resolve_key(message.key()) else {
            self.stats.frames_dropped += 1;
            debug!(key = %message.key(), "dropping message unknown to the catalog");
            return None;
        };
        let params = match descriptor.decode(&message.args) {
            Ok(params) => params,
            Err(err) => {
                self.stats.frames_dropped += 1;
                warn!(path = %descriptor.path, error = %err, "dropping undecodable message");
                return None;
            }
        };
        debug!(path = %descriptor.path, seq = frame.seq, "event received");
        Some(ResolvedMessage {
            message,
            descriptor,
            params,
        })
    }

    fn correlate(&mut self, message: ResolvedMessage) {
        let terminates = self
            .pending
            .front()
            .and_then(|head| head.command.descriptor.terminator)
            .is_some_and(|terminator| message.message.matches(terminator));

        if terminates {
            if let Some(head) = self.pending.pop_front() {
                let batch = std::mem::take(&mut self.buffer);
                debug!(
                    path = %head.command.descriptor.path,
                    events = batch.len(),
                    "command resolved"
                );
                self.completions.push_back((head.responder, Ok(batch)));
            }
            self.start_head();
            return;
        }

        if !self.pending.is_empty() {
            self.buffer.push(message.clone());
        }
        self.events.push_back(SessionEvent::Message(message));
    }

    /// Send the queue head, failing and skipping heads that cannot be framed.
    fn start_head(&mut self) {
        while let Some(head) = self.pending.front() {
            let command = head.command.clone();
            match self.transmit(&command) {
                Ok(()) => return,
                Err(err) => {
                    if let Some(failed) = self.pending.pop_front() {
                        self.completions.push_back((failed.responder, Err(err)));
                    }
                }
            }
        }
    }

    fn transmit(&mut self, command: &Command) -> Result<()> {
        let descriptor = &command.descriptor;
        let seq = self.counters.next(descriptor.channel);

        let mut payload = BytesMut::new();
        encode_message(descriptor.key, &command.args, &mut payload);
        let mut dst = BytesMut::new();
        encode_frame(FrameType::Data, descriptor.channel, seq, &payload, &mut dst)?;

        debug!(path = %descriptor.path, channel = descriptor.channel, seq, "sending command");
        self.stats.commands_sent += 1;
        self.transmits.push_back(dst.freeze());
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.pending.len())
            .field("buffered", &self.buffer.len())
            .field("transmits", &self.transmits.len())
            .field("stats", &self.stats)
            .finish()
    }
}
