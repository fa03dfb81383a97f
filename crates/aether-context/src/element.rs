//! Element ID stamping and content shaping.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use aether_types::ElementKind;

/// Process-wide generator of prefix-typed element IDs (`DOC-1`, `THR-2`, ...).
/// IDs are unique across all kinds for the generator's lifetime.
#[derive(Debug, Default)]
pub struct ElementIdGenerator {
    counters: [AtomicU64; 5],
}

impl ElementIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, kind: ElementKind) -> String {
        let index = ElementKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(0);
        let n = self.counters[index].fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-{}", kind.prefix(), n)
    }
}

/// Render a brokered record body into element content. Known summary fields
/// are preferred over dumping the whole record.
pub fn element_content(body: &Value) -> String {
    if let Some(content) = body.get("content").and_then(Value::as_str) {
        return content.to_string();
    }

    if let Some(threat_type) = body.get("threat_type").and_then(Value::as_str) {
        let lat = body
            .pointer("/location/lat")
            .and_then(Value::as_f64)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let lon = body
            .pointer("/location/lon")
            .and_then(Value::as_f64)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return format!("{threat_type} at ({lat}, {lon})");
    }

    if let Some(platform) = body.get("platform").and_then(Value::as_str) {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        return format!("{platform} ({status})");
    }

    if let Some(mission_type) = body.get("mission_type").and_then(Value::as_str) {
        let id = body
            .get("mission_id")
            .and_then(Value::as_str)
            .unwrap_or("unassigned");
        return format!("{mission_type} mission {id}");
    }

    body.to_string()
}
