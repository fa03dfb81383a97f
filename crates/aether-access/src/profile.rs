//! Agent access profiles and per-category access policies.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use aether_types::{AccessLevel, AtoPhase, InformationCategory};

/// Access policy for one information category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub category: InformationCategory,
    pub min_level: AccessLevel,
    #[serde(default)]
    pub need_to_know: bool,
    /// When set, access is only permitted during the listed phases.
    #[serde(default)]
    pub phase_restricted: Option<HashSet<AtoPhase>>,
    #[serde(default)]
    pub sanitize: bool,
    #[serde(default)]
    pub audit: bool,
}

/// The full category-policy table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    policies: HashMap<InformationCategory, AccessPolicy>,
}

impl PolicySet {
    pub fn new(policies: Vec<AccessPolicy>) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.category, p)).collect(),
        }
    }

    pub fn get(&self, category: InformationCategory) -> Option<&AccessPolicy> {
        self.policies.get(&category)
    }
}

/// Immutable per-agent access profile, created at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub role: String,
    pub access_level: AccessLevel,
    pub authorized_categories: HashSet<InformationCategory>,
    pub authorized_actions: HashSet<String>,
    /// Empty set means the agent is not phase-restricted.
    pub active_phases: HashSet<AtoPhase>,
    #[serde(default)]
    pub delegation_authority: bool,
    #[serde(default = "default_delegation_level")]
    pub max_delegation_level: AccessLevel,
}

fn default_delegation_level() -> AccessLevel {
    AccessLevel::Internal
}

impl AgentProfile {
    pub fn is_active_in(&self, phase: AtoPhase) -> bool {
        self.active_phases.is_empty() || self.active_phases.contains(&phase)
    }
}

/// Check whether `profile` may read `category`, optionally in `phase`.
/// Returns the denial reason on failure.
pub fn check_access(
    profile: &AgentProfile,
    policies: &PolicySet,
    category: InformationCategory,
    phase: Option<AtoPhase>,
) -> Result<(), String> {
    if !profile.authorized_categories.contains(&category) {
        return Err(format!("category {category} not in authorized categories"));
    }

    let policy = policies
        .get(category)
        .ok_or_else(|| format!("no access policy defined for category {category}"))?;

    if profile.access_level < policy.min_level {
        return Err(format!(
            "insufficient access level (required: {})",
            policy.min_level
        ));
    }

    if let (Some(allowed), Some(phase)) = (&policy.phase_restricted, phase) {
        if !allowed.contains(&phase) {
            return Err(format!("access to {category} not allowed in phase {phase}"));
        }
    }

    Ok(())
}

/// Check whether `profile` may perform `action`, optionally in `phase`.
pub fn check_action(
    profile: &AgentProfile,
    action: &str,
    phase: Option<AtoPhase>,
) -> Result<(), String> {
    if !profile.authorized_actions.contains(action) {
        return Err(format!("action '{action}' not in authorized actions"));
    }
    if let Some(phase) = phase {
        if !profile.is_active_in(phase) {
            return Err(format!("agent not active in phase {phase}"));
        }
    }
    Ok(())
}

/// Default access policies per information category.
pub fn default_policies() -> PolicySet {
    use AccessLevel::*;
    use InformationCategory::*;

    let policy = |category, min_level, need_to_know, sanitize, audit| AccessPolicy {
        category,
        min_level,
        need_to_know,
        phase_restricted: None,
        sanitize,
        audit,
    };

    PolicySet::new(vec![
        policy(Doctrine, Public, false, false, false),
        policy(ThreatData, Operational, true, true, true),
        policy(AssetStatus, Operational, false, false, true),
        policy(SpectrumAllocation, Operational, true, false, true),
        policy(MissionPlan, Sensitive, true, true, true),
        policy(Organizational, Internal, false, false, false),
        policy(ProcessMetrics, Internal, false, false, true),
    ])
}

/// Default profiles for the five AOC planning agents.
pub fn default_profiles() -> Vec<AgentProfile> {
    use AccessLevel::*;
    use AtoPhase::*;
    use InformationCategory::*;

    fn strings(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    vec![
        AgentProfile {
            id: "ems_strategy".to_string(),
            role: "ems_strategy".to_string(),
            access_level: Sensitive,
            authorized_categories: [Doctrine, ThreatData, Organizational, ProcessMetrics]
                .into_iter()
                .collect(),
            authorized_actions: strings(&[
                "query_doctrine",
                "query_threats",
                "develop_strategy",
                "request_information",
            ]),
            active_phases: [Phase1Oeg, Phase2TargetDevelopment].into_iter().collect(),
            delegation_authority: false,
            max_delegation_level: Internal,
        },
        AgentProfile {
            id: "spectrum_manager".to_string(),
            role: "spectrum_manager".to_string(),
            access_level: Operational,
            authorized_categories: [Doctrine, SpectrumAllocation, AssetStatus, ThreatData]
                .into_iter()
                .collect(),
            authorized_actions: strings(&[
                "query_doctrine",
                "allocate_frequency",
                "check_spectrum_conflicts",
                "coordinate_deconfliction",
                "emergency_reallocation",
                "query_assets",
            ]),
            active_phases: [Phase3Weaponeering, Phase5Execution].into_iter().collect(),
            delegation_authority: true,
            max_delegation_level: Operational,
        },
        AgentProfile {
            id: "ew_planner".to_string(),
            role: "ew_planner".to_string(),
            access_level: Sensitive,
            authorized_categories: [
                Doctrine,
                ThreatData,
                AssetStatus,
                MissionPlan,
                SpectrumAllocation,
            ]
            .into_iter()
            .collect(),
            authorized_actions: strings(&[
                "query_doctrine",
                "query_threats",
                "query_assets",
                "plan_ew_missions",
                "request_frequency_allocation",
                "assign_ems_asset",
                "check_fratricide",
            ]),
            active_phases: [Phase3Weaponeering].into_iter().collect(),
            delegation_authority: false,
            max_delegation_level: Internal,
        },
        AgentProfile {
            id: "ato_producer".to_string(),
            role: "ato_producer".to_string(),
            access_level: Sensitive,
            authorized_categories: [Doctrine, MissionPlan, SpectrumAllocation, AssetStatus]
                .into_iter()
                .collect(),
            authorized_actions: strings(&[
                "query_doctrine",
                "produce_ato_ems_annex",
                "validate_mission_approvals",
                "integrate_ems_with_strikes",
            ]),
            active_phases: [Phase4AtoProduction].into_iter().collect(),
            delegation_authority: false,
            max_delegation_level: Internal,
        },
        AgentProfile {
            id: "assessment".to_string(),
            role: "assessment".to_string(),
            access_level: Operational,
            authorized_categories: [Doctrine, MissionPlan, ProcessMetrics, Organizational]
                .into_iter()
                .collect(),
            authorized_actions: strings(&[
                "query_doctrine",
                "assess_ato_cycle",
                "analyze_doctrine_effectiveness",
                "generate_lessons_learned",
                "query_process_metrics",
            ]),
            active_phases: [Phase6Assessment].into_iter().collect(),
            delegation_authority: false,
            max_delegation_level: Internal,
        },
    ]
}
