//! Portable transcript documents: building exports and validating imports.

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use lectern_store::types::ChatMessage;
use lectern_store::types::ExportDocument;
use lectern_store::types::ExportMessage;
use lectern_store::types::Role;
use serde_json::Value;

use crate::error::ImportError;
use crate::outline::OutlineItem;

pub const EXPORT_VERSION: &str = "1.0";

/// Build the export document for one item's transcript.
pub fn to_document(item: &OutlineItem, history: &[ChatMessage], now_ms: i64) -> ExportDocument {
    ExportDocument {
        version: EXPORT_VERSION.to_string(),
        object_id: item.id.clone(),
        object_title: item.title.clone(),
        object_type: item.kind.clone(),
        export_time: now_ms,
        export_time_string: local_time_string(now_ms),
        messages: history
            .iter()
            .map(|m| ExportMessage {
                role: m.role,
                content: m.content.clone(),
                time: m.time,
                time_string: local_time_string(m.time),
            })
            .collect(),
    }
}

/// Messages of a validated document, ready for merging.
pub fn messages(doc: &ExportDocument) -> Vec<ChatMessage> {
    doc.messages
        .iter()
        .map(|m| ChatMessage::new(m.role, m.content.clone(), m.time))
        .collect()
}

pub fn parse(text: &str) -> Result<ExportDocument, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    validate(&value)
}

/// Check every required field before anything is merged. One bad message
/// rejects the whole document.
pub fn validate(value: &Value) -> Result<ExportDocument, ImportError> {
    let obj = value.as_object().ok_or(ImportError::NotAnObject)?;

    let version = match obj.get("version") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ImportError::MissingVersion),
    };
    let object_id = match obj.get("objectId") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        _ => return Err(ImportError::MissingObjectId),
    };
    let raw_messages = obj
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(ImportError::MissingMessages)?;

    let mut messages = Vec::with_capacity(raw_messages.len());
    for (index, raw) in raw_messages.iter().enumerate() {
        messages.push(validate_message(raw).map_err(|reason| ImportError::InvalidMessage {
            index,
            reason: reason.to_string(),
        })?);
    }

    Ok(ExportDocument {
        version,
        object_id,
        object_title: string_field(obj, "objectTitle"),
        object_type: string_field(obj, "objectType"),
        export_time: obj.get("exportTime").and_then(Value::as_i64).unwrap_or_default(),
        export_time_string: string_field(obj, "exportTimeString"),
        messages,
    })
}

fn validate_message(raw: &Value) -> Result<ExportMessage, &'static str> {
    let m = raw.as_object().ok_or("not an object")?;
    let role = match m.get("role").and_then(Value::as_str) {
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        _ => return Err("role must be \"user\" or \"assistant\""),
    };
    let content = m
        .get("content")
        .and_then(Value::as_str)
        .ok_or("content must be a string")?;
    let time = m
        .get("time")
        .and_then(Value::as_i64)
        .ok_or("time must be an integer timestamp")?;
    Ok(ExportMessage {
        role,
        content: content.to_string(),
        time,
        time_string: m
            .get("timeString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn string_field(obj: &serde_json::Map<String, Value>, name: &str) -> String {
    obj.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn local_time_string(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
