//! A connected device: one connection plus the feature state rebuilt from it.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::{
    CloseReason, CommandResponse, ConnectionEvent, ConnectionEvents, ConnectionHandle,
};
use crate::error::{ConnectionError, Result};
use crate::feature::{DroneManager, Feature, FeatureKind, PropertyChange, DRONE_MANAGER};
use crate::session::ResolvedMessage;

/// Notifications from a [`Device`], in arrival order.
#[derive(Debug)]
pub enum DeviceEvent {
    /// First message received from the device.
    Connected,
    /// A feature id was seen for the first time.
    FeatureAttached { feature_id: u8, name: String },
    /// A property of a feature changed.
    PropertyChanged {
        feature_id: u8,
        change: PropertyChange,
    },
    /// Every delivered message, after its property update.
    Message(ResolvedMessage),
    Ping { seq: u8, payload: Bytes },
    Error(ConnectionError),
    /// Always the last event.
    Disconnected(CloseReason),
}

/// Serializable view of a device's state.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub uid: String,
    pub connected: bool,
    pub features: BTreeMap<String, Feature>,
}

/// One connection and the feature properties rebuilt from its events.
///
/// Link-level replies run on the connection task, but feature state and the
/// bootstrap commands only advance while [`Device::next_event`] is polled.
/// Events wait in an unbounded queue until then, so a device that is kept
/// open must be drained continuously or memory grows with device traffic.
#[derive(Debug)]
pub struct Device {
    uid: String,
    handle: ConnectionHandle,
    events: ConnectionEvents,
    features: BTreeMap<u8, Feature>,
    connected: bool,
    queued: VecDeque<DeviceEvent>,
}

impl Device {
    pub fn new(uid: impl Into<String>, handle: ConnectionHandle, events: ConnectionEvents) -> Self {
        Self {
            uid: uid.into(),
            handle,
            events,
            features: BTreeMap::new(),
            connected: false,
            queued: VecDeque::new(),
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Whether a message has been received and the connection is still open.
    pub fn is_connected(&self) -> bool {
        self.connected && !self.handle.is_closed()
    }

    pub fn features(&self) -> &BTreeMap<u8, Feature> {
        &self.features
    }

    pub fn feature(&self, id: u8) -> Option<&Feature> {
        self.features.get(&id)
    }

    /// Typed drone manager commands, once that feature has been seen.
    pub fn drone_manager(&self) -> Option<DroneManager> {
        self.features
            .contains_key(&DRONE_MANAGER)
            .then(|| DroneManager::new(self.handle.clone()))
    }

    pub fn submit(&self, path: &str, params: &Value) -> Result<CommandResponse> {
        self.handle.submit(path, params)
    }

    pub async fn send_command(&self, path: &str, params: Value) -> Result<Vec<ResolvedMessage>> {
        self.handle.send_command(path, params).await
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            uid: self.uid.clone(),
            connected: self.is_connected(),
            features: self
                .features
                .values()
                .map(|feature| (feature.name().to_string(), feature.clone()))
                .collect(),
        }
    }

    /// Next device event. `None` once [`DeviceEvent::Disconnected`] has been
    /// returned.
    pub async fn next_event(&mut self) -> Option<DeviceEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            let event = self.events.recv().await?;
            self.process(event);
        }
    }

    fn process(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(message) => {
                if !self.connected {
                    self.connected = true;
                    info!(uid = %self.uid, "device connected");
                    self.queued.push_back(DeviceEvent::Connected);
                }
                let feature_id = message.message.feature_id;
                if !self.features.contains_key(&feature_id) {
                    self.attach_feature(feature_id);
                }
                if let Some(change) = self
                    .features
                    .get_mut(&feature_id)
                    .and_then(|feature| feature.apply(&message))
                {
                    self.queued.push_back(DeviceEvent::PropertyChanged { feature_id, change });
                }
                self.queued.push_back(DeviceEvent::Message(message));
            }
            ConnectionEvent::Ping { seq, payload } => {
                self.queued.push_back(DeviceEvent::Ping { seq, payload });
            }
            ConnectionEvent::Error(error) => {
                self.queued.push_back(DeviceEvent::Error(error));
            }
            ConnectionEvent::Closed(reason) => {
                self.connected = false;
                self.queued.push_back(DeviceEvent::Disconnected(reason));
            }
        }
    }

    fn attach_feature(&mut self, feature_id: u8) {
        let name = self
            .handle
            .catalog()
            .feature_name(feature_id)
            .unwrap_or_else(|| format!("feature_{feature_id:#04x}"));
        let feature = Feature::new(feature_id, name.clone());
        debug!(uid = %self.uid, feature = %name, "feature attached");

        for &path in feature.kind().bootstrap_commands() {
            self.bootstrap(feature.kind(), path);
        }

        self.features.insert(feature_id, feature);
        self.queued
            .push_back(DeviceEvent::FeatureAttached { feature_id, name });
    }

    fn bootstrap(&self, kind: FeatureKind, path: &'static str) {
        let response = match self.handle.submit(path, &Value::Null) {
            Ok(response) => response,
            Err(err) => {
                warn!(uid = %self.uid, path, error = %err, "bootstrap command rejected");
                return;
            }
        };
        let uid = self.uid.clone();
        tokio::spawn(async move {
            match response.await {
                Ok(batch) => {
                    debug!(uid = %uid, ?kind, path, messages = batch.len(), "bootstrap complete")
                }
                Err(err) => debug!(uid = %uid, ?kind, path, error = %err, "bootstrap abandoned"),
            }
        });
    }
}
