//! AetherOS - the AI-mediated orchestration kernel.
//!
//! One `AetherOs` value owns the shared state for the active ATO cycle: the
//! agent registry, the orchestrator, the authorization engine, the
//! information broker, the context provisioner, and the process-improvement
//! log. Nothing here is ambient; every subsystem is a field, passed
//! explicitly where needed.

pub mod config;
pub mod kernel;
pub mod performance;

pub use config::AetherConfig;
pub use kernel::AetherOs;

pub use aether_access::{AuthorizationContext, Decision};
pub use aether_broker::BrokerResponse;
pub use aether_context::{AgentContext, UsageReport};
pub use aether_llm::{LlmAdapter, OutputSchema};
pub use aether_orchestrator::{PhaseEvent, PhaseEventKind};
pub use aether_types::{AetherError, AtoPhase, InformationCategory, Result};
