//! Six-factor authorization engine.
//!
//! Every privileged action is gated on six independent factors:
//!
//! 1. role authority            (`role`)
//! 2. phase appropriateness     (`phase`)
//! 3. information access        (`information_access`)
//! 4. delegation chain          (`delegation`)
//! 5. doctrinal fit             (`doctrine`)
//! 6. external policy           (`external_policy`)
//!
//! All factors are evaluated on every call; the decision's `reasons` list
//! names each failing factor so callers and auditors see the full picture.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use aether_doctrine::{ComplianceStatus, DoctrineKb};
use aether_types::{AtoPhase, Clock, InformationCategory};

use crate::policy_client::{PolicyClient, PolicyOutcome};
use crate::profile::{check_access, AgentProfile, PolicySet};

/// Minimum approver rank for emergency reallocation during execution.
const EMERGENCY_APPROVAL_MIN_RANK: u8 = 5; // O-5

/// Context supplied with an authorization request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizationContext {
    /// Information categories the action touches.
    #[serde(default)]
    pub categories: Vec<InformationCategory>,
    /// Delegation chain, outermost principal first. Depth is capped at 1.
    #[serde(default)]
    pub delegation_chain: Vec<String>,
    /// Approver rank for emergency actions, e.g. `"O-5"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by_rank: Option<String>,
    /// Free-form action detail forwarded to the external evaluator.
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl AuthorizationContext {
    pub fn with_categories(categories: Vec<InformationCategory>) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }
}

/// Result of an authorization check. `reasons` holds one token per failing
/// factor; `notes` carries non-fatal markers such as `doctrine_unavailable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    pub reasons: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Decision {
    pub fn denied_for(&self, factor: &str) -> bool {
        self.reasons.iter().any(|r| r == factor)
    }
}

/// The multi-factor authorization engine.
pub struct AuthorizationEngine {
    policies: PolicySet,
    doctrine: Arc<DoctrineKb>,
    policy_client: Option<Arc<PolicyClient>>,
    clock: Arc<dyn Clock>,
    /// Optional per-phase action allowlists; a missing entry leaves the
    /// phase unrestricted beyond profile activity.
    phase_actions: HashMap<AtoPhase, HashSet<String>>,
}

impl AuthorizationEngine {
    pub fn new(
        policies: PolicySet,
        doctrine: Arc<DoctrineKb>,
        policy_client: Option<Arc<PolicyClient>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            doctrine,
            policy_client,
            clock,
            phase_actions: HashMap::new(),
        }
    }

    pub fn with_phase_actions(
        mut self,
        phase_actions: HashMap<AtoPhase, HashSet<String>>,
    ) -> Self {
        self.phase_actions = phase_actions;
        self
    }

    /// Decide whether `profile` may perform `action` in `current_phase`.
    pub async fn authorize(
        &self,
        profile: &AgentProfile,
        action: &str,
        ctx: &AuthorizationContext,
        current_phase: Option<AtoPhase>,
    ) -> Decision {
        let mut reasons = Vec::new();
        let mut notes = Vec::new();

        // Factor 1: role authority.
        if !profile.authorized_actions.contains(action) {
            reasons.push("role".to_string());
            notes.push(format!("action '{action}' not in authorized actions"));
        }

        // Factor 2: phase appropriateness.
        if let Some(phase) = current_phase {
            let active = profile.is_active_in(phase);
            let phase_allows = self
                .phase_actions
                .get(&phase)
                .map(|allowed| allowed.contains(action))
                .unwrap_or(true);
            if !active || !phase_allows {
                reasons.push("phase".to_string());
                if !active {
                    notes.push(format!("agent not active in phase {phase}"));
                } else {
                    notes.push(format!("action '{action}' not allowed in phase {phase}"));
                }
            }
        }

        // Factor 3: information access, for each touched category.
        for category in &ctx.categories {
            if let Err(detail) = check_access(profile, &self.policies, *category, current_phase) {
                if !reasons.iter().any(|r| r == "information_access") {
                    reasons.push("information_access".to_string());
                }
                notes.push(detail);
            }
        }

        // Factor 4: delegation chain, depth capped at 1.
        if !ctx.delegation_chain.is_empty() {
            if !profile.delegation_authority {
                reasons.push("delegation".to_string());
                notes.push("agent lacks delegation authority".to_string());
            } else if ctx.delegation_chain.len() > 1 {
                reasons.push("delegation".to_string());
                notes.push(format!(
                    "delegation depth {} exceeds maximum 1",
                    ctx.delegation_chain.len()
                ));
            }
        }

        // Factor 5: doctrinal fit. Adapter outage soft-passes; only an
        // explicit non-compliance verdict fails the factor.
        let description = format!("{} performs {}", profile.role, action);
        match self.doctrine.check_compliance(&description).await {
            Ok(verdict) => {
                if verdict.status == ComplianceStatus::NonCompliant {
                    reasons.push("doctrine".to_string());
                    notes.push(verdict.rationale);
                }
            }
            Err(_) => {
                notes.push("doctrine_unavailable".to_string());
            }
        }

        // Factor 6: external policy. Authoritative when reachable; an open
        // breaker degrades to deny.
        if let Some(client) = &self.policy_client {
            let agent = json!({
                "id": profile.id,
                "role": profile.role,
                "access_level": profile.access_level.rank(),
            });
            let action_input = json!({
                "type": action,
                "detail": ctx.detail,
            });
            let cycle = json!({
                "current_phase": current_phase.map(|p| p.to_string()),
            });
            match client
                .evaluate(&agent, &action_input, &cycle, self.clock.as_ref())
                .await
            {
                PolicyOutcome::Allowed => {}
                PolicyOutcome::Denied => {
                    reasons.push("external_policy".to_string());
                    notes.push("external policy denied the action".to_string());
                }
                PolicyOutcome::Unreachable => {
                    notes.push("external_policy_unreachable".to_string());
                }
                PolicyOutcome::CircuitOpen => {
                    reasons.push("external_policy".to_string());
                    notes.push("external policy circuit open; degraded to deny".to_string());
                }
            }
        }

        // Edge policy: emergency reallocation needs an O-5 or higher approver.
        if action == "emergency_reallocation" {
            let approved = ctx
                .approved_by_rank
                .as_deref()
                .and_then(parse_officer_rank)
                .map(|rank| rank >= EMERGENCY_APPROVAL_MIN_RANK)
                .unwrap_or(false);
            if !approved {
                reasons.push("approval_rank".to_string());
                notes.push("emergency reallocation requires approval by O-5 or above".to_string());
            }
        }

        let allow = reasons.is_empty();
        if allow {
            tracing::info!(agent = %profile.id, action, "action authorized");
        } else {
            tracing::warn!(
                agent = %profile.id,
                action,
                reasons = ?reasons,
                "action denied"
            );
        }

        Decision {
            allow,
            reasons,
            notes,
        }
    }

    /// Authorize a frequency allocation request with spectrum context.
    pub async fn authorize_frequency_allocation(
        &self,
        profile: &AgentProfile,
        frequency_range_mhz: (f64, f64),
        time_window: (&str, &str),
        current_phase: Option<AtoPhase>,
    ) -> Decision {
        let ctx = AuthorizationContext {
            categories: vec![InformationCategory::SpectrumAllocation],
            detail: json!({
                "frequency_range_mhz": [frequency_range_mhz.0, frequency_range_mhz.1],
                "time_window": [time_window.0, time_window.1],
            }),
            ..AuthorizationContext::default()
        };
        self.authorize(profile, "allocate_frequency", &ctx, current_phase)
            .await
    }

    /// Authorize assigning an asset to a mission.
    pub async fn authorize_asset_assignment(
        &self,
        profile: &AgentProfile,
        asset_id: &str,
        mission_id: &str,
        current_phase: Option<AtoPhase>,
    ) -> Decision {
        let ctx = AuthorizationContext {
            categories: vec![InformationCategory::AssetStatus],
            detail: json!({
                "asset_id": asset_id,
                "mission_id": mission_id,
            }),
            ..AuthorizationContext::default()
        };
        self.authorize(profile, "assign_ems_asset", &ctx, current_phase)
            .await
    }
}

/// Parse an officer rank like `"O-5"` into its numeric grade.
fn parse_officer_rank(rank: &str) -> Option<u8> {
    rank.trim()
        .strip_prefix("O-")
        .or_else(|| rank.trim().strip_prefix("o-"))
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_doctrine::{DoctrineKb, MemoryDoctrineIndex, UnavailableIndex};
    use aether_types::SystemClock;

    use crate::profile::{default_policies, default_profiles};

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new(
            default_policies(),
            Arc::new(DoctrineKb::new(Arc::new(MemoryDoctrineIndex::new()))),
            None,
            Arc::new(SystemClock),
        )
    }

    fn profile(id: &str) -> AgentProfile {
        default_profiles()
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    #[tokio::test]
    async fn all_factors_pass_allows() {
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "allocate_frequency",
                &AuthorizationContext::with_categories(vec![
                    InformationCategory::SpectrumAllocation,
                ]),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(decision.allow, "reasons: {:?}", decision.reasons);
    }

    #[tokio::test]
    async fn unauthorized_action_fails_role_factor() {
        let decision = engine()
            .authorize(
                &profile("ew_planner"),
                "allocate_frequency",
                &AuthorizationContext::default(),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("role"));
    }

    #[tokio::test]
    async fn wrong_phase_fails_phase_factor() {
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "allocate_frequency",
                &AuthorizationContext::default(),
                Some(AtoPhase::Phase1Oeg),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("phase"));
    }

    #[tokio::test]
    async fn failures_are_not_short_circuited() {
        // Wrong action AND wrong phase AND unauthorized category: all three
        // factors must appear.
        let decision = engine()
            .authorize(
                &profile("assessment"),
                "allocate_frequency",
                &AuthorizationContext::with_categories(vec![
                    InformationCategory::SpectrumAllocation,
                ]),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("role"));
        assert!(decision.denied_for("phase"));
        assert!(decision.denied_for("information_access"));
    }

    #[tokio::test]
    async fn delegation_depth_capped_at_one() {
        let mut ctx = AuthorizationContext::default();
        ctx.delegation_chain = vec!["ew_planner".to_string()];
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "allocate_frequency",
                &ctx,
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(decision.allow);

        ctx.delegation_chain = vec!["ew_planner".to_string(), "ato_producer".to_string()];
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "allocate_frequency",
                &ctx,
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("delegation"));
    }

    #[tokio::test]
    async fn delegation_requires_authority() {
        let mut ctx = AuthorizationContext::default();
        ctx.delegation_chain = vec!["spectrum_manager".to_string()];
        let decision = engine()
            .authorize(
                &profile("ew_planner"),
                "plan_ew_missions",
                &ctx,
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("delegation"));
    }

    #[tokio::test]
    async fn doctrine_outage_soft_passes() {
        let engine = AuthorizationEngine::new(
            default_policies(),
            Arc::new(DoctrineKb::new(Arc::new(UnavailableIndex))),
            None,
            Arc::new(SystemClock),
        );
        let decision = engine
            .authorize(
                &profile("spectrum_manager"),
                "allocate_frequency",
                &AuthorizationContext::default(),
                Some(AtoPhase::Phase3Weaponeering),
            )
            .await;
        assert!(decision.allow);
        assert!(decision.notes.iter().any(|n| n == "doctrine_unavailable"));
    }

    #[tokio::test]
    async fn emergency_reallocation_requires_o5_approval() {
        let mut ctx = AuthorizationContext::default();
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "emergency_reallocation",
                &ctx,
                Some(AtoPhase::Phase5Execution),
            )
            .await;
        assert!(!decision.allow);
        assert!(decision.denied_for("approval_rank"));

        ctx.approved_by_rank = Some("O-4".to_string());
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "emergency_reallocation",
                &ctx,
                Some(AtoPhase::Phase5Execution),
            )
            .await;
        assert!(!decision.allow);

        ctx.approved_by_rank = Some("O-6".to_string());
        let decision = engine()
            .authorize(
                &profile("spectrum_manager"),
                "emergency_reallocation",
                &ctx,
                Some(AtoPhase::Phase5Execution),
            )
            .await;
        assert!(decision.allow, "reasons: {:?}", decision.reasons);
    }
}
