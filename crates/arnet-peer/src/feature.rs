//! Per-feature property state rebuilt from device events.

use std::collections::BTreeMap;

use arnet_catalog::{EventShape, Params};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{json, Value};

use crate::connection::ConnectionHandle;
use crate::error::Result;
use crate::session::ResolvedMessage;

/// Feature id of the Bebop-class drone feature.
pub const ARDRONE3: u8 = 0x01;
/// Feature id of the SkyController remote.
pub const SKYCONTROLLER: u8 = 0x04;
/// Feature id of the drone manager (remote-side pairing).
pub const DRONE_MANAGER: u8 = 0x89;

/// First item of a list or map; discard what was accumulated.
pub const LIST_FIRST: u64 = 0x01;
/// Last item of a list or map; publish the result.
pub const LIST_LAST: u64 = 0x02;

/// Features with dedicated behavior. Everything else is `Generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureKind {
    ArDrone3,
    SkyController,
    DroneManager,
    Generic,
}

impl FeatureKind {
    pub fn from_id(feature_id: u8) -> Self {
        match feature_id {
            ARDRONE3 => Self::ArDrone3,
            SKYCONTROLLER => Self::SkyController,
            DRONE_MANAGER => Self::DroneManager,
            _ => Self::Generic,
        }
    }

    /// Commands sent when the feature is first seen on a connection, to make
    /// the device replay its full state.
    pub fn bootstrap_commands(self) -> &'static [&'static str] {
        match self {
            Self::ArDrone3 => &["common.Common.AllStates", "common.Settings.AllSettings"],
            Self::SkyController => &["skyctrl.Common.AllStates", "skyctrl.Settings.AllSettings"],
            Self::DroneManager | Self::Generic => &[],
        }
    }
}

/// Stored value of one property.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(Params),
    List(Vec<Params>),
    Map(BTreeMap<String, Params>),
}

/// A property update worth announcing.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub property: String,
    pub value: PropertyValue,
}

/// Properties of one feature on one connection.
#[derive(Debug, Clone)]
pub struct Feature {
    id: u8,
    name: String,
    kind: FeatureKind,
    props: BTreeMap<String, PropertyValue>,
}

impl Feature {
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: FeatureKind::from_id(id),
            props: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn props(&self) -> &BTreeMap<String, PropertyValue> {
        &self.props
    }

    pub fn prop(&self, name: &str) -> Option<&PropertyValue> {
        self.props.get(name)
    }

    /// Fold a message into the properties.
    pub fn apply(&mut self, message: &ResolvedMessage) -> Option<PropertyChange> {
        reassemble(&mut self.props, message)
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.props.len() + 1))?;
        map.serialize_entry("type", &self.name)?;
        for (name, value) in &self.props {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Fold one message into a feature's properties.
///
/// Project-style messages and plain events replace their property and always
/// produce a change. List and map items accumulate; a change is produced only
/// by the item carrying [`LIST_LAST`], after it has been added.
pub fn reassemble(
    props: &mut BTreeMap<String, PropertyValue>,
    message: &ResolvedMessage,
) -> Option<PropertyChange> {
    let descriptor = &message.descriptor;
    let property = descriptor.property_name();
    let params = message.params.clone();

    let shape = if descriptor.legacy_project {
        &EventShape::Plain
    } else {
        &descriptor.event_shape
    };

    match shape {
        EventShape::Plain => {
            let value = PropertyValue::Scalar(params);
            props.insert(property.clone(), value.clone());
            Some(PropertyChange { property, value })
        }
        EventShape::ListItem => {
            let flags = list_flags(&params);
            let entry = props
                .entry(property.clone())
                .or_insert_with(|| PropertyValue::List(Vec::new()));
            if flags & LIST_FIRST != 0 || !matches!(entry, PropertyValue::List(_)) {
                *entry = PropertyValue::List(Vec::new());
            }
            if let PropertyValue::List(items) = entry {
                items.push(params);
            }
            finish(property, entry, flags)
        }
        EventShape::MapItem { key } => {
            let flags = list_flags(&params);
            let item_key = map_key(&params, key);
            let entry = props
                .entry(property.clone())
                .or_insert_with(|| PropertyValue::Map(BTreeMap::new()));
            if flags & LIST_FIRST != 0 || !matches!(entry, PropertyValue::Map(_)) {
                *entry = PropertyValue::Map(BTreeMap::new());
            }
            if let PropertyValue::Map(items) = entry {
                items.insert(item_key, params);
            }
            finish(property, entry, flags)
        }
    }
}

fn finish(property: String, entry: &PropertyValue, flags: u64) -> Option<PropertyChange> {
    (flags & LIST_LAST != 0).then(|| PropertyChange {
        property,
        value: entry.clone(),
    })
}

fn list_flags(params: &Params) -> u64 {
    params
        .get("list_flags")
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

fn map_key(params: &Params, key: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Typed commands of the drone manager feature.
#[derive(Debug, Clone)]
pub struct DroneManager {
    handle: ConnectionHandle,
}

impl DroneManager {
    pub(crate) fn new(handle: ConnectionHandle) -> Self {
        Self { handle }
    }

    /// Pair with a drone. An absent key is sent as an empty string.
    pub async fn connect(&self, serial: &str, key: Option<&str>) -> Result<Vec<ResolvedMessage>> {
        self.handle
            .send_command(
                "drone_manager.commands.connect",
                json!({ "serial": serial, "key": key.unwrap_or("") }),
            )
            .await
    }

    /// Ask the remote to scan for drones.
    pub async fn discover_drones(&self) -> Result<Vec<ResolvedMessage>> {
        self.handle
            .send_command("drone_manager.commands.discover_drones", Value::Null)
            .await
    }

    /// Drop a remembered drone.
    pub async fn forget(&self, serial: &str) -> Result<Vec<ResolvedMessage>> {
        self.handle
            .send_command(
                "drone_manager.commands.forget",
                json!({ "serial": serial }),
            )
            .await
    }
}
