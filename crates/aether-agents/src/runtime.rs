//! Agent capability trait and the kernel-side handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use aether_access::AgentProfile;
use aether_types::{AetherError, AtoPhase, Result};

use crate::messaging::ReplyEnvelope;

/// The capability set every registered agent implements.
#[async_trait]
pub trait AetherAgent: Send + Sync {
    fn agent_id(&self) -> &str;

    /// Handle a point-to-point message and produce a reply payload.
    async fn handle_message(&self, from: &str, message_type: &str, payload: Value)
        -> Result<Value>;

    /// Run this agent's work for a phase, returning its outputs.
    async fn execute_phase_tasks(&self, phase: AtoPhase, cycle_id: &str) -> Result<Value>;

    async fn on_activate(&self) {}

    async fn on_deactivate(&self) {}
}

/// Kernel-side wrapper binding an agent to its profile, activation state,
/// and per-agent task serialization.
pub struct AgentHandle {
    pub profile: AgentProfile,
    agent: Arc<dyn AetherAgent>,
    active: AtomicBool,
    /// At most one task runs per agent; deliveries to the same agent queue
    /// here in FIFO order.
    task_lock: Mutex<()>,
}

impl AgentHandle {
    pub fn new(profile: AgentProfile, agent: Arc<dyn AetherAgent>) -> Self {
        Self {
            profile,
            agent,
            active: AtomicBool::new(false),
            task_lock: Mutex::new(()),
        }
    }

    pub fn agent(&self) -> &Arc<dyn AetherAgent> {
        &self.agent
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip the activation gate without running lifecycle hooks. Returns
    /// whether the flag changed. Used by the kernel's phase-event handler,
    /// which runs synchronously; hooks are driven afterwards.
    pub fn set_active_flag(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst) != active
    }

    pub async fn activate(&self) {
        if !self.active.swap(true, Ordering::SeqCst) {
            self.agent.on_activate().await;
            tracing::info!(agent = %self.profile.id, "agent activated");
        }
    }

    pub async fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.agent.on_deactivate().await;
            tracing::info!(agent = %self.profile.id, "agent deactivated");
        }
    }

    /// Deliver a message to this agent. Fails with `NotActive` when the
    /// agent is outside its phase; otherwise the delivery serializes behind
    /// any task already running on the agent.
    pub async fn deliver(&self, from: &str, message_type: &str, payload: Value) -> ReplyEnvelope {
        if !self.is_active() {
            return ReplyEnvelope::err(
                AetherError::NotActive {
                    agent_id: self.profile.id.clone(),
                }
                .to_string(),
            );
        }

        let _task = self.task_lock.lock().await;
        tracing::debug!(
            from,
            to = %self.profile.id,
            message_type,
            "message delivered"
        );
        match self.agent.handle_message(from, message_type, payload).await {
            Ok(payload) => ReplyEnvelope::ok(payload),
            Err(error) => ReplyEnvelope::err(error.to_string()),
        }
    }

    /// Run the agent's phase tasks under the task lock.
    pub async fn run_phase(&self, phase: AtoPhase, cycle_id: &str) -> Result<Value> {
        if !self.is_active() {
            return Err(AetherError::NotActive {
                agent_id: self.profile.id.clone(),
            });
        }
        let _task = self.task_lock.lock().await;
        self.agent.execute_phase_tasks(phase, cycle_id).await
    }
}
