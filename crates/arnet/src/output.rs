use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use arnet_catalog::{MessageCatalog, MessageDescriptor, MessageKind};
use arnet_frame::channel_name;
use arnet_peer::{DeviceEvent, ResolvedMessage};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One printable line of `listen` output.
#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub event: &'static str,
    pub uid: String,
    pub subject: String,
    pub detail: Value,
    pub timestamp: String,
}

impl EventRecord {
    /// Whether the record reports device data rather than lifecycle.
    pub fn is_data(&self) -> bool {
        matches!(self.event, "message" | "property")
    }
}

/// Describe a device event; pings are not reported.
pub fn event_record(uid: &str, event: &DeviceEvent) -> Option<EventRecord> {
    let (event, subject, detail) = match event {
        DeviceEvent::Connected => ("connected", uid.to_string(), Value::Null),
        DeviceEvent::FeatureAttached { feature_id, name } => (
            "feature",
            name.clone(),
            json!({ "feature_id": feature_id }),
        ),
        DeviceEvent::PropertyChanged { feature_id, change } => (
            "property",
            change.property.clone(),
            json!({ "feature_id": feature_id, "value": change.value }),
        ),
        DeviceEvent::Message(message) => (
            "message",
            message.path().to_string(),
            Value::Object(message.params.clone()),
        ),
        DeviceEvent::Error(err) => ("error", uid.to_string(), json!(err.to_string())),
        DeviceEvent::Disconnected(reason) => {
            ("disconnected", uid.to_string(), json!(reason.to_string()))
        }
        DeviceEvent::Ping { .. } => return None,
    };
    Some(EventRecord {
        event,
        uid: uid.to_string(),
        subject,
        detail,
        timestamp: now_unix_seconds(),
    })
}

pub fn print_event(record: &EventRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "SUBJECT", "DETAIL"])
                .add_row(vec![
                    record.event.to_string(),
                    record.subject.clone(),
                    compact(&record.detail),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} {}",
                record.event,
                record.subject,
                compact(&record.detail)
            );
        }
    }
}

/// Print the messages a command resolved with.
pub fn print_batch(path: &str, batch: &[ResolvedMessage], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = json!({ "command": path, "response": batch });
            println!("{out}");
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["MESSAGE", "PARAMS"]);
            for message in batch {
                table.add_row(vec![
                    message.path().to_string(),
                    compact(&Value::Object(message.params.clone())),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{path}: {} message(s)", batch.len());
            for message in batch {
                println!(
                    "  {} {}",
                    message.path(),
                    compact(&Value::Object(message.params.clone()))
                );
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct DescriptorOutput<'a> {
    path: &'a str,
    id: String,
    kind: MessageKind,
    channel: &'static str,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminator: Option<String>,
}

fn descriptor_output<'a>(
    descriptor: &'a MessageDescriptor,
    catalog: &dyn MessageCatalog,
) -> DescriptorOutput<'a> {
    DescriptorOutput {
        path: &descriptor.path,
        id: descriptor.key.to_string(),
        kind: descriptor.kind,
        channel: match descriptor.kind {
            MessageKind::Command => channel_name(descriptor.channel),
            MessageKind::Event => "-",
        },
        args: descriptor
            .args
            .iter()
            .map(|arg| format!("{}:{}", arg.name, arg.ty.as_str()))
            .collect(),
        terminator: descriptor.terminator.map(|key| {
            catalog
                .resolve_key(key)
                .map(|d| d.path.clone())
                .unwrap_or_else(|| key.to_string())
        }),
    }
}

pub fn print_descriptors<'a>(
    descriptors: impl IntoIterator<Item = &'a MessageDescriptor>,
    catalog: &dyn MessageCatalog,
    format: OutputFormat,
) {
    let rows: Vec<_> = descriptors
        .into_iter()
        .map(|descriptor| descriptor_output(descriptor, catalog))
        .collect();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PATH", "ID", "KIND", "CHANNEL", "ARGS", "EXPECTS"]);
            for row in &rows {
                table.add_row(vec![
                    row.path.to_string(),
                    row.id.clone(),
                    kind_name(row.kind).to_string(),
                    row.channel.to_string(),
                    row.args.join(", "),
                    row.terminator.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                let expects = row
                    .terminator
                    .as_deref()
                    .map(|t| format!(" -> {t}"))
                    .unwrap_or_default();
                println!(
                    "{} [{}] {}({}){}",
                    row.path,
                    row.id,
                    kind_name(row.kind),
                    row.args.join(", "),
                    expects
                );
            }
        }
    }
}

fn kind_name(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Command => "command",
        MessageKind::Event => "event",
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
