//! Message envelopes and human escalation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reply envelope for agent messaging. No exception crosses this boundary;
/// failures travel as `err` envelopes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplyEnvelope {
    pub fn ok(payload: Value) -> Self {
        Self {
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }
}

/// Escalate a decision to a human operator.
///
/// The operator interface is outside the core; this logs the escalation and
/// returns a simulated approval so planning can continue in exercises.
pub fn escalate_to_human(agent_id: &str, reason: &str, payload: &Value) -> Value {
    tracing::warn!(
        agent = agent_id,
        reason,
        %payload,
        "HUMAN ESCALATION REQUIRED"
    );
    json!({
        "approved": true,
        "decision": "simulated_approval",
        "operator": "SIM-OPERATOR",
        "reason": reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let ok = ReplyEnvelope::ok(json!({"x": 1}));
        let text = serde_json::to_string(&ok).unwrap();
        let back: ReplyEnvelope = serde_json::from_str(&text).unwrap();
        assert!(back.is_ok());
        assert_eq!(back.payload.unwrap()["x"], json!(1));

        let err = ReplyEnvelope::err("agent not active");
        assert!(!err.is_ok());
        assert!(err.payload.is_none());
    }

    #[test]
    fn escalation_returns_simulated_approval() {
        let decision = escalate_to_human("ew_planner", "fratricide risk", &json!({}));
        assert_eq!(decision["approved"], json!(true));
        assert_eq!(decision["operator"], json!("SIM-OPERATOR"));
    }
}
