//! Agent runtime.
//!
//! Registered agents implement [`AetherAgent`]; the kernel wraps each in an
//! [`AgentHandle`] carrying its profile, activation gate, and per-agent task
//! serialization. The [`ProcedureRunner`] times doctrinal procedures against
//! doctrine's expected duration and auto-flags deviations without ever
//! turning a timing anomaly into an error.

pub mod messaging;
pub mod procedure;
pub mod runtime;

pub use messaging::{escalate_to_human, ReplyEnvelope};
pub use procedure::ProcedureRunner;
pub use runtime::{AetherAgent, AgentHandle};
