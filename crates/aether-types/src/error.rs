//! Kernel error taxonomy. No other error type escapes the kernel boundary.

use thiserror::Error;

use crate::phase::AtoPhase;

#[derive(Error, Debug, Clone)]
pub enum AetherError {
    /// An authorization factor failed; `reasons` names every failing factor.
    #[error("Unauthorized: {}", reasons.join(", "))]
    Unauthorized { reasons: Vec<String> },

    /// The agent is not in the current phase's active set.
    #[error("Agent {agent_id} is not active in the current phase")]
    NotActive { agent_id: String },

    /// The orchestrator rejected a phase move.
    #[error("Illegal phase transition: {from} -> {to}")]
    IllegalTransition { from: AtoPhase, to: AtoPhase },

    /// A cycle is already active.
    #[error("Cycle {cycle_id} is already active")]
    AlreadyActive { cycle_id: String },

    /// The agent ID is not registered.
    #[error("Unknown agent: {agent_id}")]
    UnknownAgent { agent_id: String },

    /// A backing subsystem or external dependency is down.
    #[error("Subsystem unavailable: {subsystem}")]
    Unavailable { subsystem: String },

    /// The call's deadline expired.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// An LLM response failed structured-output validation.
    #[error("Schema violation: {message}")]
    SchemaViolation { message: String },

    /// A context budget or ID-uniqueness invariant was violated. Always a bug.
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AetherError {
    pub fn unavailable(subsystem: impl Into<String>) -> Self {
        Self::Unavailable {
            subsystem: subsystem.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AetherError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AetherError>;
