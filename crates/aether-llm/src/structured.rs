//! Record schemas for structured LLM output.
//!
//! Schemas describe flat records: named fields with typed kinds, required
//! markers, bounded floats, and enumerated strings. Validation failure is a
//! hard error for the caller; the adapter never coerces or repairs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{LlmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldKind {
    Text,
    Boolean,
    Integer,
    /// A float bounded to `[min, max]`; confidence scores use `[0, 1]`.
    Float {
        min: f64,
        max: f64,
    },
    /// One of a closed set of string values.
    Enumerated {
        values: Vec<String>,
    },
    TextList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// A flat record schema for structured output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSchema {
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: true,
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
        });
        self
    }

    /// A confidence field bounded to [0, 1].
    pub fn confidence(self, name: &str) -> Self {
        self.required(name, FieldKind::Float { min: 0.0, max: 1.0 })
    }

    /// Validate a parsed JSON value against this schema. Collects every
    /// violation rather than stopping at the first.
    pub fn validate(&self, value: &Value) -> Result<()> {
        let Some(object) = value.as_object() else {
            return Err(LlmError::SchemaViolation {
                message: "response is not a JSON object".to_string(),
            });
        };

        let mut violations = Vec::new();
        for spec in &self.fields {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        violations.push(format!("missing required field '{}'", spec.name));
                    }
                }
                Some(field_value) => {
                    if let Err(violation) = check_kind(&spec.name, &spec.kind, field_value) {
                        violations.push(violation);
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(LlmError::SchemaViolation {
                message: violations.join("; "),
            })
        }
    }
}

fn check_kind(name: &str, kind: &FieldKind, value: &Value) -> std::result::Result<(), String> {
    match kind {
        FieldKind::Text => value
            .as_str()
            .map(drop)
            .ok_or_else(|| format!("field '{name}' must be a string")),
        FieldKind::Boolean => value
            .as_bool()
            .map(drop)
            .ok_or_else(|| format!("field '{name}' must be a boolean")),
        FieldKind::Integer => value
            .as_i64()
            .map(drop)
            .ok_or_else(|| format!("field '{name}' must be an integer")),
        FieldKind::Float { min, max } => match value.as_f64() {
            Some(f) if f >= *min && f <= *max => Ok(()),
            Some(f) => Err(format!(
                "field '{name}' value {f} outside bounds [{min}, {max}]"
            )),
            None => Err(format!("field '{name}' must be a number")),
        },
        FieldKind::Enumerated { values } => match value.as_str() {
            Some(s) if values.iter().any(|v| v == s) => Ok(()),
            Some(s) => Err(format!(
                "field '{name}' value '{s}' not in {values:?}"
            )),
            None => Err(format!("field '{name}' must be a string")),
        },
        FieldKind::TextList => match value.as_array() {
            Some(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => Err(format!("field '{name}' must be a list of strings")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mission_schema() -> OutputSchema {
        OutputSchema::new()
            .required("mission_id", FieldKind::Text)
            .required(
                "mission_type",
                FieldKind::Enumerated {
                    values: vec!["EA".to_string(), "ES".to_string(), "EP".to_string()],
                },
            )
            .confidence("confidence")
            .optional("citations", FieldKind::TextList)
    }

    #[test]
    fn valid_record_passes() {
        let value = json!({
            "mission_id": "MSN-001",
            "mission_type": "EA",
            "confidence": 0.82,
            "citations": ["DOC-1", "THR-2"],
        });
        assert!(mission_schema().validate(&value).is_ok());
    }

    #[test]
    fn missing_required_field_fails() {
        let value = json!({"mission_type": "EA", "confidence": 0.5});
        let err = mission_schema().validate(&value).unwrap_err();
        assert!(err.to_string().contains("mission_id"));
    }

    #[test]
    fn out_of_bounds_confidence_fails() {
        let value = json!({
            "mission_id": "MSN-001",
            "mission_type": "EA",
            "confidence": 1.4,
        });
        assert!(mission_schema().validate(&value).is_err());
    }

    #[test]
    fn unknown_enum_value_fails() {
        let value = json!({
            "mission_id": "MSN-001",
            "mission_type": "STRIKE",
            "confidence": 0.5,
        });
        assert!(mission_schema().validate(&value).is_err());
    }

    #[test]
    fn violations_are_collected_not_short_circuited() {
        let value = json!({"mission_type": "STRIKE", "confidence": 7.0});
        let err = mission_schema().validate(&value).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mission_id"));
        assert!(message.contains("mission_type"));
        assert!(message.contains("confidence"));
    }

    #[test]
    fn non_object_fails() {
        assert!(mission_schema().validate(&json!([1, 2])).is_err());
    }
}
