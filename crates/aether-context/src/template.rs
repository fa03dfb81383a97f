//! Per-role, per-phase context templates.

use serde::{Deserialize, Serialize};

use aether_types::AtoPhase;

/// Fractional token-budget split across the four layers. Fractions sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LayerSplit {
    pub doctrinal: f32,
    pub situational: f32,
    pub historical: f32,
    pub collaborative: f32,
}

impl Default for LayerSplit {
    fn default() -> Self {
        Self {
            doctrinal: 0.40,
            situational: 0.30,
            historical: 0.20,
            collaborative: 0.10,
        }
    }
}

/// Template controlling window composition for one role in one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextTemplate {
    pub split: LayerSplit,
    /// Doctrine query focus areas, prepended to the task query.
    pub doctrine_priorities: Vec<String>,
    /// How many past cycles of history to surface.
    pub historical_depth: usize,
}

impl Default for ContextTemplate {
    fn default() -> Self {
        Self {
            split: LayerSplit::default(),
            doctrine_priorities: vec!["general".to_string()],
            historical_depth: 1,
        }
    }
}

/// Resolve the template for `(role, phase)`. Phases with no specific entry
/// fall back to the default split.
pub fn template_for(role: &str, phase: AtoPhase) -> ContextTemplate {
    fn priorities(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    match (phase, role) {
        (AtoPhase::Phase1Oeg, "ems_strategy") => ContextTemplate {
            doctrine_priorities: priorities(&["strategy_development", "commander_guidance"]),
            historical_depth: 3,
            ..ContextTemplate::default()
        },
        (AtoPhase::Phase2TargetDevelopment, "ems_strategy") => ContextTemplate {
            doctrine_priorities: priorities(&["target_development", "ems_requirements"]),
            historical_depth: 2,
            ..ContextTemplate::default()
        },
        // Weaponeering is situational-heavy for the planners.
        (AtoPhase::Phase3Weaponeering, "ew_planner") => ContextTemplate {
            split: LayerSplit {
                doctrinal: 0.30,
                situational: 0.45,
                historical: 0.15,
                collaborative: 0.10,
            },
            doctrine_priorities: priorities(&["mission_planning", "asset_assignment"]),
            historical_depth: 1,
        },
        (AtoPhase::Phase3Weaponeering, "spectrum_manager") => ContextTemplate {
            split: LayerSplit {
                doctrinal: 0.30,
                situational: 0.45,
                historical: 0.15,
                collaborative: 0.10,
            },
            doctrine_priorities: priorities(&["jceoi_process", "deconfliction"]),
            historical_depth: 1,
        },
        (AtoPhase::Phase4AtoProduction, "ato_producer") => ContextTemplate {
            doctrine_priorities: priorities(&["ato_integration", "mission_approval"]),
            historical_depth: 1,
            ..ContextTemplate::default()
        },
        (AtoPhase::Phase5Execution, "spectrum_manager") => ContextTemplate {
            split: LayerSplit {
                doctrinal: 0.25,
                situational: 0.55,
                historical: 0.05,
                collaborative: 0.15,
            },
            doctrine_priorities: priorities(&["emergency_procedures", "conflict_resolution"]),
            historical_depth: 0,
        },
        // Assessment digs deep into history.
        (AtoPhase::Phase6Assessment, "assessment") => ContextTemplate {
            split: LayerSplit {
                doctrinal: 0.25,
                situational: 0.15,
                historical: 0.45,
                collaborative: 0.15,
            },
            doctrine_priorities: priorities(&["assessment", "lessons_learned"]),
            historical_depth: 5,
        },
        _ => ContextTemplate::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_is_40_30_20_10() {
        let split = LayerSplit::default();
        assert_eq!(split.doctrinal, 0.40);
        assert_eq!(split.situational, 0.30);
        assert_eq!(split.historical, 0.20);
        assert_eq!(split.collaborative, 0.10);
    }

    #[test]
    fn phase3_boosts_situational() {
        let template = template_for("ew_planner", AtoPhase::Phase3Weaponeering);
        assert!(template.split.situational > LayerSplit::default().situational);
    }

    #[test]
    fn splits_sum_to_one() {
        for phase in AtoPhase::ALL {
            for role in ["ems_strategy", "spectrum_manager", "ew_planner", "ato_producer", "assessment"] {
                let split = template_for(role, phase).split;
                let sum = split.doctrinal + split.situational + split.historical + split.collaborative;
                assert!((sum - 1.0).abs() < 1e-6, "{role} in {phase}: {sum}");
            }
        }
    }
}
