use arnet_frame::{channel, MessageKey};
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::args::{decode_arg, encode_arg, ArgFault, ArgSpec};
use crate::error::{CatalogError, Result};

/// Decoded message arguments keyed by argument name.
pub type Params = Map<String, Value>;

/// Direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Controller to device.
    Command,
    /// Device to controller.
    Event,
}

/// How an event contributes to its feature's properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "shape")]
pub enum EventShape {
    /// Replaces the stored value.
    Plain,
    /// One element of a list delivered over several messages.
    ListItem,
    /// One entry of a map delivered over several messages, keyed by the
    /// named argument.
    MapItem { key: String },
}

/// Everything the engine needs to know about one catalog message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    pub key: MessageKey,
    /// Dotted path, `feature.Class.Message`.
    pub path: String,
    pub feature: String,
    pub class: String,
    pub name: String,
    pub kind: MessageKind,
    /// Channel a command is sent on.
    pub channel: u8,
    pub args: Vec<ArgSpec>,
    /// Event that ends the command's correlation window.
    pub terminator: Option<MessageKey>,
    /// Project-style (`Class.MessageChanged`) rather than feature-style naming.
    pub legacy_project: bool,
    pub event_shape: EventShape,
}

impl MessageDescriptor {
    /// Property name under which this event's state is stored.
    ///
    /// Project-style events use `Class.Message` with a trailing `Changed`
    /// removed; feature-style events use the message name.
    pub fn property_name(&self) -> String {
        if self.legacy_project {
            let name = self.name.strip_suffix("Changed").unwrap_or(&self.name);
            format!("{}.{}", self.class, name)
        } else {
            self.name.clone()
        }
    }

    /// Encode arguments given by name (object), by position (array), or
    /// absent (null, for messages without arguments).
    pub fn encode(&self, params: &Value) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        match params {
            Value::Null => {
                if !self.args.is_empty() {
                    return Err(self.count_error(0));
                }
            }
            Value::Object(map) => {
                for spec in &self.args {
                    let value = map.get(&spec.name).ok_or_else(|| {
                        CatalogError::MissingArgument {
                            path: self.path.clone(),
                            arg: spec.name.clone(),
                        }
                    })?;
                    self.encode_one(spec, value, &mut dst)?;
                }
            }
            Value::Array(values) => {
                if values.len() != self.args.len() {
                    return Err(self.count_error(values.len()));
                }
                for (spec, value) in self.args.iter().zip(values) {
                    self.encode_one(spec, value, &mut dst)?;
                }
            }
            _ if self.args.len() == 1 => self.encode_one(&self.args[0], params, &mut dst)?,
            _ => return Err(self.count_error(1)),
        }
        Ok(dst.freeze())
    }

    /// Decode argument bytes. Bytes past the last declared argument are
    /// ignored.
    pub fn decode(&self, mut src: &[u8]) -> Result<Params> {
        let mut params = Params::new();
        for spec in &self.args {
            let value = decode_arg(spec, &mut src).map_err(|fault| self.fault(spec, fault))?;
            params.insert(spec.name.clone(), value);
        }
        if !src.is_empty() {
            tracing::trace!(path = %self.path, extra = src.len(), "ignoring trailing argument bytes");
        }
        Ok(params)
    }

    /// Whether the device acknowledges this command at the link layer.
    pub fn is_acknowledged(&self) -> bool {
        self.channel != channel::COMMAND_NO_ACK
    }

    fn encode_one(&self, spec: &ArgSpec, value: &Value, dst: &mut BytesMut) -> Result<()> {
        encode_arg(spec, value, dst).map_err(|fault| self.fault(spec, fault))
    }

    fn fault(&self, spec: &ArgSpec, fault: ArgFault) -> CatalogError {
        match fault {
            ArgFault::Invalid(reason) => CatalogError::InvalidArgument {
                path: self.path.clone(),
                arg: spec.name.clone(),
                reason,
            },
            ArgFault::Truncated => CatalogError::TruncatedArguments {
                path: self.path.clone(),
                arg: spec.name.clone(),
            },
        }
    }

    fn count_error(&self, got: usize) -> CatalogError {
        CatalogError::ArgumentCount {
            path: self.path.clone(),
            expected: self.args.len(),
            got,
        }
    }
}
