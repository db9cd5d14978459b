use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use arnet_frame::{channel, MessageKey};
use serde::Deserialize;

use crate::args::ArgSpec;
use crate::config::CatalogConfig;
use crate::descriptor::{EventShape, MessageDescriptor, MessageKind};
use crate::error::{CatalogError, Result};

/// Lookup of message descriptors by path and by numeric identity.
///
/// The connection engine only ever talks to a catalog through this trait.
pub trait MessageCatalog: Send + Sync {
    /// Resolve a dotted `feature.Class.Message` path.
    fn resolve_path(&self, path: &str) -> Option<Arc<MessageDescriptor>>;

    /// Resolve a message by `(feature, class, message)` ids.
    fn resolve_key(&self, key: MessageKey) -> Option<Arc<MessageDescriptor>>;

    /// Name of a feature id, if the catalog knows it.
    fn feature_name(&self, feature_id: u8) -> Option<String>;
}

/// Message catalog built from JSON feature documents.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    by_path: BTreeMap<String, Arc<MessageDescriptor>>,
    by_key: HashMap<MessageKey, Arc<MessageDescriptor>>,
    features: BTreeMap<u8, String>,
}

const EMBEDDED: [(&str, &str); 4] = [
    ("common", include_str!("../catalog/common.json")),
    ("ardrone3", include_str!("../catalog/ardrone3.json")),
    ("skyctrl", include_str!("../catalog/skyctrl.json")),
    ("drone_manager", include_str!("../catalog/drone_manager.json")),
];

impl Catalog {
    /// Build a catalog from JSON documents.
    ///
    /// Terminator paths may refer to messages in any of the given documents.
    pub fn from_documents<S: AsRef<str>>(documents: &[S]) -> Result<Self> {
        let mut parsed = Vec::with_capacity(documents.len());
        for doc in documents {
            parsed.push(serde_json::from_str::<FeatureDocument>(doc.as_ref())?);
        }
        Self::build(parsed)
    }

    /// The catalog compiled into this crate (common, ardrone3, skyctrl and
    /// drone_manager).
    pub fn embedded() -> Result<Self> {
        let docs: Vec<&str> = embedded_documents().map(|(_, doc)| doc).collect();
        Self::from_documents(&docs)
    }

    /// Load a catalog from a single JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = read_document(path, &CatalogConfig::default())?;
        Self::from_documents(&[content])
    }

    /// Load every `*.json` document in a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, CatalogConfig::default())
    }

    /// Load documents from a directory with explicit config.
    pub fn from_directory_with_config(path: &Path, config: CatalogConfig) -> Result<Self> {
        let entries = std::fs::read_dir(path)
            .map_err(|err| CatalogError::LoadFailed(format!("{}: {err}", path.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CatalogError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy().into_owned();
            let Some(stem) = file_name.strip_suffix(".json") else {
                continue;
            };
            if let Some(modules) = &config.modules {
                if !modules.iter().any(|m| m == stem) {
                    tracing::debug!(file = %file_name, "skipping catalog module not selected");
                    continue;
                }
            }
            names.push(file_name);
        }
        // Deterministic load order keeps duplicate errors stable.
        names.sort();

        if names.len() > config.max_documents_from_directory {
            return Err(CatalogError::LoadFailed(format!(
                "catalog document count exceeds configured max ({}): {}",
                config.max_documents_from_directory,
                names.len()
            )));
        }

        let mut documents = Vec::with_capacity(names.len());
        for name in &names {
            documents.push(read_document(&path.join(name), &config)?);
        }
        tracing::debug!(dir = %path.display(), documents = documents.len(), "loaded catalog documents");
        Self::from_documents(&documents)
    }

    /// All message paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.by_path.keys().map(String::as_str)
    }

    /// All descriptors in path order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<MessageDescriptor>> {
        self.by_path.values()
    }

    /// Known features as `(id, name)` in id order.
    pub fn features(&self) -> impl Iterator<Item = (u8, &str)> {
        self.features.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    fn build(documents: Vec<FeatureDocument>) -> Result<Self> {
        let mut catalog = Self::default();
        // Terminators are resolved once every document is known.
        let mut expects: Vec<(MessageDescriptor, Option<String>)> = Vec::new();
        let mut keys_by_path: HashMap<String, MessageKey> = HashMap::new();

        for feature in documents {
            if let Some(existing) = catalog.features.get(&feature.id) {
                if existing != &feature.name {
                    return Err(CatalogError::Duplicate(format!(
                        "feature id {} used by {existing} and {}",
                        feature.id, feature.name
                    )));
                }
            }
            catalog.features.insert(feature.id, feature.name.clone());

            for class in &feature.classes {
                for message in &class.messages {
                    let descriptor = message.to_descriptor(&feature, class)?;
                    if keys_by_path
                        .insert(descriptor.path.clone(), descriptor.key)
                        .is_some()
                    {
                        return Err(CatalogError::Duplicate(descriptor.path));
                    }
                    let terminator = message.expects.as_ref().and_then(|e| e.immediate.clone());
                    expects.push((descriptor, terminator));
                }
            }
        }

        for (mut descriptor, terminator) in expects {
            if let Some(path) = terminator {
                let key = keys_by_path.get(&path).copied().ok_or_else(|| {
                    CatalogError::UnknownTerminator {
                        path: descriptor.path.clone(),
                        terminator: path.clone(),
                    }
                })?;
                descriptor.terminator = Some(key);
            }

            let descriptor = Arc::new(descriptor);
            if catalog
                .by_key
                .insert(descriptor.key, Arc::clone(&descriptor))
                .is_some()
            {
                return Err(CatalogError::Duplicate(format!(
                    "{} reuses message key {}",
                    descriptor.path, descriptor.key
                )));
            }
            catalog.by_path.insert(descriptor.path.clone(), descriptor);
        }

        Ok(catalog)
    }
}

/// The JSON documents behind [`Catalog::embedded`], as `(module, document)`.
pub fn embedded_documents() -> impl Iterator<Item = (&'static str, &'static str)> {
    EMBEDDED.into_iter()
}

impl MessageCatalog for Catalog {
    fn resolve_path(&self, path: &str) -> Option<Arc<MessageDescriptor>> {
        self.by_path.get(path).cloned()
    }

    fn resolve_key(&self, key: MessageKey) -> Option<Arc<MessageDescriptor>> {
        self.by_key.get(&key).cloned()
    }

    fn feature_name(&self, feature_id: u8) -> Option<String> {
        self.features.get(&feature_id).cloned()
    }
}

/// One feature as written in a catalog document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeatureDocument {
    id: u8,
    name: String,
    /// Project-style naming (`Class.MessageChanged` events).
    #[serde(default)]
    project: bool,
    classes: Vec<ClassDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassDocument {
    id: u8,
    name: String,
    messages: Vec<MessageDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageDocument {
    id: u16,
    name: String,
    kind: MessageKind,
    #[serde(default)]
    buffer: Buffer,
    #[serde(default)]
    args: Vec<ArgSpec>,
    #[serde(default)]
    expects: Option<ExpectsDocument>,
    #[serde(default)]
    list_type: Option<ListType>,
    #[serde(default)]
    map_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExpectsDocument {
    immediate: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Buffer {
    NonAck,
    #[default]
    Ack,
    HighPrio,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ListType {
    List,
    Map,
}

impl MessageDocument {
    fn to_descriptor(
        &self,
        feature: &FeatureDocument,
        class: &ClassDocument,
    ) -> Result<MessageDescriptor> {
        let path = format!("{}.{}.{}", feature.name, class.name, self.name);
        let invalid = |reason: &str| CatalogError::InvalidEntry {
            path: path.clone(),
            reason: reason.to_string(),
        };

        let event_shape = match (self.list_type, &self.map_key) {
            (None, None) => EventShape::Plain,
            (Some(ListType::List), None) => EventShape::ListItem,
            (Some(ListType::Map), Some(key)) => {
                if !self.args.iter().any(|a| &a.name == key) {
                    return Err(invalid("map_key does not name an argument"));
                }
                EventShape::MapItem { key: key.clone() }
            }
            (Some(ListType::Map), None) => return Err(invalid("map list_type requires map_key")),
            (_, Some(_)) => return Err(invalid("map_key requires list_type map")),
        };
        if event_shape != EventShape::Plain && self.kind != MessageKind::Event {
            return Err(invalid("only events can be list or map items"));
        }

        let channel = match self.buffer {
            Buffer::NonAck => channel::COMMAND_NO_ACK,
            Buffer::Ack => channel::COMMAND_WITH_ACK,
            Buffer::HighPrio => channel::COMMAND_HIGH_PRIORITY,
        };

        Ok(MessageDescriptor {
            key: MessageKey::new(feature.id, class.id, self.id),
            path,
            feature: feature.name.clone(),
            class: class.name.clone(),
            name: self.name.clone(),
            kind: self.kind,
            channel,
            args: self.args.clone(),
            terminator: None,
            legacy_project: feature.project,
            event_shape,
        })
    }
}

fn read_document(path: &Path, config: &CatalogConfig) -> Result<String> {
    let metadata = std::fs::symlink_metadata(path)
        .map_err(|err| CatalogError::LoadFailed(format!("{}: {err}", path.display())))?;
    if metadata.file_type().is_symlink() {
        return Err(CatalogError::LoadFailed(format!(
            "refusing to load catalog symlink: {}",
            path.display()
        )));
    }
    if !metadata.is_file() {
        return Err(CatalogError::LoadFailed(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    if metadata.len() > config.max_document_size as u64 {
        return Err(CatalogError::LoadFailed(format!(
            "catalog document too large ({} bytes): {}",
            metadata.len(),
            path.display()
        )));
    }

    let file = std::fs::File::open(path).map_err(|err| {
        CatalogError::LoadFailed(format!("failed opening {}: {err}", path.display()))
    })?;
    let read_limit = u64::try_from(config.max_document_size.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            CatalogError::LoadFailed(format!("failed reading {}: {err}", path.display()))
        })?;
    if content.len() > config.max_document_size {
        return Err(CatalogError::LoadFailed(format!(
            "catalog document too large while reading: {}",
            path.display()
        )));
    }
    Ok(content)
}
