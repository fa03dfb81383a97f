//! Kernel configuration: the three logical config trees (agent profiles,
//! access policies, cycle schedule) plus tunables.

use std::sync::Arc;

use aether_access::{default_policies, default_profiles, AgentProfile, PolicyClient, PolicySet};
use aether_improvement::FlagThresholds;
use aether_orchestrator::CycleSchedule;

pub struct AetherConfig {
    pub profiles: Vec<AgentProfile>,
    pub policies: PolicySet,
    pub schedule: CycleSchedule,
    /// External policy evaluator; `None` disables the sixth factor.
    pub policy_client: Option<Arc<PolicyClient>>,
    pub thresholds: FlagThresholds,
    /// Default context window budget in tokens.
    pub default_context_tokens: u32,
}

impl Default for AetherConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            policies: default_policies(),
            schedule: CycleSchedule::default(),
            policy_client: None,
            thresholds: FlagThresholds::default(),
            default_context_tokens: 32_000,
        }
    }
}

impl AetherConfig {
    /// Configuration with the external policy evaluator wired from the
    /// environment (`AETHER_POLICY_URL`).
    pub fn with_policy_from_env(mut self) -> Self {
        self.policy_client = Some(Arc::new(PolicyClient::from_env()));
        self
    }
}
