//! The AetherOS kernel value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use aether_access::{AgentProfile, AuthorizationContext, AuthorizationEngine, Decision};
use aether_agents::{escalate_to_human, AetherAgent, AgentHandle, ProcedureRunner, ReplyEnvelope};
use aether_broker::{AuditLog, BrokerBackends, BrokerResponse, InformationBroker};
use aether_context::{
    AgentContext, CollaborationSource, ContextProvisioner, Embedder, RefreshTrigger, UsageReport,
    UtilizationTracker,
};
use aether_doctrine::{DoctrineIndex, DoctrineKb};
use aether_improvement::ImprovementLogger;
use aether_llm::LlmAdapter;
use aether_orchestrator::{AtoCycle, CycleOrchestrator, PhaseEvent, PhaseEventKind};
use aether_types::{AetherError, AtoPhase, Clock, InformationCategory, Result};

use crate::config::AetherConfig;
use crate::performance;

/// Collaborative context backed by the current cycle's shared outputs.
struct CycleArtifacts {
    orchestrator: Arc<CycleOrchestrator>,
}

impl CollaborationSource for CycleArtifacts {
    fn shared_artifacts(&self) -> Vec<(String, Value)> {
        self.orchestrator.current_outputs()
    }
}

/// The kernel. Owns every subsystem and the process-wide logs; provides the
/// stable public API agents and operators call.
pub struct AetherOs {
    clock: Arc<dyn Clock>,
    doctrine: Arc<DoctrineKb>,
    authorization: AuthorizationEngine,
    broker: Arc<InformationBroker>,
    improvement: Arc<ImprovementLogger>,
    orchestrator: Arc<CycleOrchestrator>,
    provisioner: ContextProvisioner,
    tracker: UtilizationTracker,
    procedures: ProcedureRunner,
    llm: Option<Arc<LlmAdapter>>,
    registry: Arc<StdRwLock<HashMap<String, Arc<AgentHandle>>>>,
    profiles: HashMap<String, AgentProfile>,
    /// Activation changes made by the synchronous phase handler, waiting for
    /// their async lifecycle hooks.
    pending_hooks: Arc<StdMutex<Vec<(String, bool)>>>,
    default_context_tokens: u32,
}

impl AetherOs {
    pub fn new(
        config: AetherConfig,
        doctrine_index: Arc<dyn DoctrineIndex>,
        backends: BrokerBackends,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_embedder(config, doctrine_index, backends, clock, None)
    }

    pub fn with_embedder(
        config: AetherConfig,
        doctrine_index: Arc<dyn DoctrineIndex>,
        backends: BrokerBackends,
        clock: Arc<dyn Clock>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let doctrine = Arc::new(DoctrineKb::new(doctrine_index));
        let broker = Arc::new(InformationBroker::new(
            config.policies.clone(),
            doctrine.clone(),
            backends,
            Arc::new(AuditLog::new()),
            clock.clone(),
        ));
        let improvement = Arc::new(ImprovementLogger::new(
            config.thresholds.clone(),
            clock.clone(),
        ));
        let orchestrator = Arc::new(CycleOrchestrator::new(config.schedule.clone(), clock.clone()));
        let provisioner = ContextProvisioner::new(
            broker.clone(),
            Arc::new(CycleArtifacts {
                orchestrator: orchestrator.clone(),
            }),
            clock.clone(),
        );
        let authorization = AuthorizationEngine::new(
            config.policies.clone(),
            doctrine.clone(),
            config.policy_client.clone(),
            clock.clone(),
        );
        let procedures = ProcedureRunner::new(improvement.clone(), clock.clone());

        let registry: Arc<StdRwLock<HashMap<String, Arc<AgentHandle>>>> =
            Arc::new(StdRwLock::new(HashMap::new()));
        let pending_hooks: Arc<StdMutex<Vec<(String, bool)>>> =
            Arc::new(StdMutex::new(Vec::new()));

        // Phase events drive activation: on each entered phase, flip every
        // agent's gate to match the schedule, queueing lifecycle hooks for
        // the next async drain.
        {
            let registry = registry.clone();
            let schedule = config.schedule.clone();
            let pending = pending_hooks.clone();
            orchestrator.subscribe(Box::new(move |event| {
                if event.kind != PhaseEventKind::Entered {
                    return Ok(());
                }
                let wanted = &schedule.definition(event.phase).active_agents;
                let registry = registry.read().map_err(|e| e.to_string())?;
                for (id, handle) in registry.iter() {
                    let should = wanted.contains(id) || handle.profile.active_phases.is_empty();
                    if handle.set_active_flag(should) {
                        pending.lock().map_err(|e| e.to_string())?.push((id.clone(), should));
                    }
                }
                Ok(())
            }));
        }

        tracing::info!("AetherOS initialized");
        Self {
            clock,
            doctrine,
            authorization,
            broker,
            improvement,
            orchestrator,
            provisioner,
            tracker: UtilizationTracker::new(embedder),
            procedures,
            llm: None,
            registry,
            profiles: config
                .profiles
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            pending_hooks,
            default_context_tokens: config.default_context_tokens,
        }
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register an agent. Its ID must match a configured profile.
    pub async fn register_agent(&self, agent: Arc<dyn AetherAgent>) -> Result<()> {
        let agent_id = agent.agent_id().to_string();
        let profile = self
            .profiles
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| AetherError::UnknownAgent {
                agent_id: agent_id.clone(),
            })?;

        let handle = Arc::new(AgentHandle::new(profile, agent));
        {
            let mut registry = self.registry.write().unwrap();
            registry.insert(agent_id.clone(), handle.clone());
        }
        tracing::info!(agent = %agent_id, "agent registered");

        if self.orchestrator.is_agent_active(&agent_id) {
            handle.activate().await;
        }
        Ok(())
    }

    pub async fn activate_agent(&self, agent_id: &str) -> Result<()> {
        let handle = self.handle(agent_id)?;
        handle.activate().await;
        Ok(())
    }

    pub async fn deactivate_agent(&self, agent_id: &str) -> Result<()> {
        let handle = self.handle(agent_id)?;
        handle.deactivate().await;
        self.provisioner
            .refresh(agent_id, RefreshTrigger::Manual)
            .await;
        Ok(())
    }

    pub fn registered_agents(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap();
        let mut ids: Vec<String> = registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn active_agents(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap();
        let mut ids: Vec<String> = registry
            .iter()
            .filter(|(_, handle)| handle.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn handle(&self, agent_id: &str) -> Result<Arc<AgentHandle>> {
        self.registry
            .read()
            .unwrap()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| AetherError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    fn profile(&self, agent_id: &str) -> Result<&AgentProfile> {
        self.profiles
            .get(agent_id)
            .ok_or_else(|| AetherError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Cycle control
    // ------------------------------------------------------------------

    pub async fn start_cycle(&self, cycle_id: &str) -> Result<AtoCycle> {
        let cycle = self.orchestrator.start_cycle(cycle_id)?;
        self.broker.reset_cycle_counters();
        self.drain_activation_hooks().await;
        Ok(cycle)
    }

    pub fn current_phase(&self) -> Option<AtoPhase> {
        self.orchestrator.current_phase()
    }

    pub fn current_cycle_id(&self) -> Option<String> {
        self.orchestrator.current_cycle_id()
    }

    pub async fn advance_phase(&self) -> Result<AtoPhase> {
        let exiting_cycle = self.orchestrator.current_cycle_id();
        let exiting_phase = self.orchestrator.current_phase();
        let phase = self.orchestrator.advance()?;
        if exiting_phase == Some(AtoPhase::Phase6Assessment) {
            if let Some(cycle_id) = exiting_cycle {
                self.finalize_cycle_telemetry(&cycle_id);
            }
        }
        self.drain_activation_hooks().await;
        Ok(phase)
    }

    /// Drive time-based transitions; see the orchestrator for semantics.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<PhaseEvent> {
        let events = self.orchestrator.tick(now);
        for event in &events {
            if event.kind == PhaseEventKind::Exited && event.phase == AtoPhase::Phase6Assessment {
                self.finalize_cycle_telemetry(&event.cycle_id);
            }
        }
        self.drain_activation_hooks().await;
        events
    }

    pub fn record_output(&self, name: &str, value: Value) -> Result<()> {
        self.orchestrator.record_output(name, value)
    }

    /// Evaluate cycle-scoped counters against the auto-flag thresholds when
    /// a cycle closes out.
    fn finalize_cycle_telemetry(&self, cycle_id: &str) {
        let conflicts = self.broker.spectrum_conflict_count();
        self.improvement.record_spectrum_conflicts(
            cycle_id,
            AtoPhase::Phase6Assessment,
            "system",
            conflicts,
        );
        let denials = self.broker.reservation_denial_count();
        self.improvement.record_reservation_denials(
            cycle_id,
            AtoPhase::Phase6Assessment,
            "system",
            denials,
        );
        self.broker.reset_cycle_counters();
    }

    /// Run the async lifecycle hooks queued by the synchronous phase
    /// handler, and refresh contexts for agents whose activation changed.
    async fn drain_activation_hooks(&self) {
        let pending: Vec<(String, bool)> = {
            let mut queue = self.pending_hooks.lock().unwrap();
            queue.drain(..).collect()
        };
        for (agent_id, activated) in pending {
            if let Ok(handle) = self.handle(&agent_id) {
                if activated {
                    handle.agent().on_activate().await;
                } else {
                    handle.agent().on_deactivate().await;
                }
            }
            self.provisioner
                .refresh(&agent_id, RefreshTrigger::PhaseTransition)
                .await;
        }
    }

    // ------------------------------------------------------------------
    // Information & authorization
    // ------------------------------------------------------------------

    /// Query information on behalf of an agent. Unauthorized or empty
    /// results for a needed category raise an information-gap flag.
    pub async fn query_information(
        &self,
        agent_id: &str,
        category: InformationCategory,
        params: &Value,
    ) -> Result<BrokerResponse> {
        let profile = self.profile(agent_id)?;
        let phase = self.orchestrator.current_phase();
        let result = self.broker.query(profile, category, params, phase).await;

        if let (Some(cycle_id), Some(phase)) = (self.orchestrator.current_cycle_id(), phase) {
            match &result {
                Err(AetherError::Unauthorized { .. }) => {
                    self.improvement.flag_information_gap(
                        &cycle_id,
                        phase,
                        agent_id,
                        "information_request",
                        &category.to_string(),
                    );
                }
                Ok(response) if response.records.is_empty() => {
                    self.improvement.flag_information_gap(
                        &cycle_id,
                        phase,
                        agent_id,
                        "information_request",
                        &format!("{category} (no records returned)"),
                    );
                }
                _ => {}
            }
        }

        result
    }

    /// Run the six-factor authorization check for an agent action.
    pub async fn authorize_action(
        &self,
        agent_id: &str,
        action: &str,
        ctx: &AuthorizationContext,
    ) -> Result<Decision> {
        let profile = self.profile(agent_id)?;
        let phase = self.orchestrator.current_phase();
        Ok(self.authorization.authorize(profile, action, ctx, phase).await)
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Point-to-point request/reply. Both endpoints must be active in the
    /// current phase; per-receiver delivery order is FIFO.
    pub async fn send_agent_message(
        &self,
        from: &str,
        to: &str,
        message_type: &str,
        payload: Value,
    ) -> Result<ReplyEnvelope> {
        let sender = self.handle(from)?;
        if !sender.is_active() {
            return Err(AetherError::NotActive {
                agent_id: from.to_string(),
            });
        }
        let receiver = self.handle(to)?;
        if !receiver.is_active() {
            return Err(AetherError::NotActive {
                agent_id: to.to_string(),
            });
        }
        Ok(receiver.deliver(from, message_type, payload).await)
    }

    /// Broadcast to all active agents. Reply aggregation is best-effort:
    /// agents that miss the deadline are dropped from the result.
    pub async fn broadcast(
        &self,
        message_type: &str,
        payload: Value,
        reply_deadline: Duration,
    ) -> HashMap<String, ReplyEnvelope> {
        let targets: Vec<Arc<AgentHandle>> = {
            let registry = self.registry.read().unwrap();
            registry
                .values()
                .filter(|h| h.is_active())
                .cloned()
                .collect()
        };

        let mut replies = HashMap::new();
        for handle in targets {
            let delivery = handle.deliver("system", message_type, payload.clone());
            match tokio::time::timeout(reply_deadline, delivery).await {
                Ok(reply) => {
                    replies.insert(handle.profile.id.clone(), reply);
                }
                Err(_) => {
                    tracing::warn!(agent = %handle.profile.id, "broadcast reply deadline missed");
                }
            }
        }
        replies
    }

    /// Escalate a decision to the human operator.
    pub fn escalate(&self, agent_id: &str, reason: &str, payload: &Value) -> Value {
        escalate_to_human(agent_id, reason, payload)
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Build a context window for an agent's current task.
    pub async fn build_agent_context(
        &self,
        agent_id: &str,
        task: &str,
        max_tokens: Option<u32>,
    ) -> Result<AgentContext> {
        let profile = self.profile(agent_id)?;
        let phase = self
            .current_phase()
            .ok_or_else(|| AetherError::unavailable("ato_cycle"))?;
        self.provisioner
            .build(
                profile,
                phase,
                task,
                max_tokens.unwrap_or(self.default_context_tokens),
            )
            .await
    }

    /// Score an agent response against its provisioned context.
    pub fn track_context_usage(
        &self,
        context: &mut AgentContext,
        response_text: &str,
    ) -> UsageReport {
        self.tracker.track(context, response_text)
    }

    /// Invalidate every cached context; new intelligence changes the
    /// situational picture for everyone.
    pub async fn notify_new_intelligence(&self) {
        self.provisioner
            .refresh("", RefreshTrigger::NewIntelligence)
            .await;
    }

    // ------------------------------------------------------------------
    // Reports & accessors
    // ------------------------------------------------------------------

    pub fn get_process_improvement_report(&self) -> String {
        self.improvement.report(5, 2)
    }

    /// Per-agent performance digest over the most recent `cycles` cycles.
    pub fn get_performance_report(&self, agent_id: &str, cycles: usize) -> String {
        let mut cycle_ids: Vec<String> = self
            .orchestrator
            .history()
            .iter()
            .map(|c| c.cycle_id.clone())
            .collect();
        cycle_ids.extend(self.orchestrator.current_cycle_id());
        let recent: Vec<String> = cycle_ids
            .into_iter()
            .rev()
            .take(cycles)
            .collect();
        performance::report(&self.improvement, &self.tracker, agent_id, &recent)
    }

    pub fn system_status(&self) -> Value {
        json!({
            "registered_agents": self.registered_agents(),
            "active_agents": self.active_agents(),
            "current_cycle": self.orchestrator.cycle_summary(None),
            "current_phase": self.current_phase().map(|p| p.to_string()),
            "flags": self.improvement.summary(),
            "context_feedback": self.tracker.feedback_summary(),
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn doctrine(&self) -> &Arc<DoctrineKb> {
        &self.doctrine
    }

    pub fn broker(&self) -> &Arc<InformationBroker> {
        &self.broker
    }

    pub fn improvement(&self) -> &Arc<ImprovementLogger> {
        &self.improvement
    }

    pub fn orchestrator(&self) -> &Arc<CycleOrchestrator> {
        &self.orchestrator
    }

    pub fn procedures(&self) -> &ProcedureRunner {
        &self.procedures
    }

    /// Attach the LLM provider chain agents dispatch through.
    pub fn with_llm(mut self, adapter: Arc<LlmAdapter>) -> Self {
        self.llm = Some(adapter);
        self
    }

    pub fn llm(&self) -> Option<&Arc<LlmAdapter>> {
        self.llm.as_ref()
    }

    pub fn tracker(&self) -> &UtilizationTracker {
        &self.tracker
    }
}
