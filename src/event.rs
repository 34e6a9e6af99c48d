//! Canonical form of a Home Assistant notification.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

pub const DEFAULT_EVENT_TYPE: &str = "unknown";
pub const DEFAULT_SOURCE: &str = "home_assistant";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_type: String,
    pub source: String,
    /// Copied from the inbound body as-is; `null` when absent.
    pub camera_entity: Option<JsonValue>,
    pub message: String,
    pub ts: String,
}

impl CanonicalEvent {
    pub fn to_compact_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub fn normalize(body: &JsonMap<String, JsonValue>) -> CanonicalEvent {
    normalize_at(body, Utc::now())
}

/// Builds the canonical event, using `now` when the body carries no usable `ts`.
pub fn normalize_at(body: &JsonMap<String, JsonValue>, now: DateTime<Utc>) -> CanonicalEvent {
    CanonicalEvent {
        event_type: first_text(body, &["event_type", "event"])
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
        source: first_text(body, &["source"]).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        camera_entity: body.get("camera_entity").cloned(),
        message: first_text(body, &["message", "description"]).unwrap_or_default(),
        ts: first_text(body, &["ts"]).unwrap_or_else(|| iso_timestamp(now)),
    }
}

/// ISO-8601 UTC with microseconds and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn first_text(body: &JsonMap<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find_map(text_value)
}

// Empty and zero-like values count as missing so the next fallback applies.
fn text_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null | JsonValue::Bool(false) => None,
        JsonValue::String(text) if text.is_empty() => None,
        JsonValue::String(text) => Some(text.clone()),
        JsonValue::Number(number) if number.as_f64() == Some(0.0) => None,
        JsonValue::Array(items) if items.is_empty() => None,
        JsonValue::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}
