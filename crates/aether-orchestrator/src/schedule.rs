//! Phase schedule for the 72-hour cycle.

use serde::{Deserialize, Serialize};

use aether_types::AtoPhase;

/// Definition of one phase in the cycle schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub phase: AtoPhase,
    pub duration_hours: f64,
    pub offset_hours: f64,
    pub active_agents: Vec<String>,
    pub key_outputs: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

/// The full cycle schedule, one definition per phase, in phase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSchedule {
    definitions: Vec<PhaseDefinition>,
}

impl CycleSchedule {
    /// Build a schedule from definitions. Definitions must cover all six
    /// phases; they are reordered into phase order.
    pub fn new(mut definitions: Vec<PhaseDefinition>) -> Self {
        definitions.sort_by_key(|d| d.phase.index());
        debug_assert_eq!(definitions.len(), AtoPhase::ALL.len());
        Self { definitions }
    }

    pub fn definition(&self, phase: AtoPhase) -> &PhaseDefinition {
        &self.definitions[phase.index()]
    }

    pub fn definitions(&self) -> &[PhaseDefinition] {
        &self.definitions
    }

    pub fn total_hours(&self) -> f64 {
        self.definitions
            .iter()
            .map(|d| d.duration_hours)
            .sum()
    }

    /// The phase scheduled at `hours_elapsed` since cycle start, or `None`
    /// once the cycle window has ended.
    pub fn phase_at(&self, hours_elapsed: f64) -> Option<AtoPhase> {
        self.definitions
            .iter()
            .find(|d| {
                hours_elapsed >= d.offset_hours
                    && hours_elapsed < d.offset_hours + d.duration_hours
            })
            .map(|d| d.phase)
    }
}

impl Default for CycleSchedule {
    /// The standard 72-hour schedule.
    fn default() -> Self {
        fn agents(ids: &[&str]) -> Vec<String> {
            ids.iter().map(|s| s.to_string()).collect()
        }
        fn outputs(names: &[&str]) -> Vec<String> {
            names.iter().map(|s| s.to_string()).collect()
        }

        Self::new(vec![
            PhaseDefinition {
                phase: AtoPhase::Phase1Oeg,
                duration_hours: 6.0,
                offset_hours: 0.0,
                active_agents: agents(&["ems_strategy"]),
                key_outputs: outputs(&["ems_strategy", "commander_guidance"]),
                critical: false,
            },
            PhaseDefinition {
                phase: AtoPhase::Phase2TargetDevelopment,
                duration_hours: 8.0,
                offset_hours: 6.0,
                active_agents: agents(&["ems_strategy"]),
                key_outputs: outputs(&["target_list", "ems_requirements"]),
                critical: false,
            },
            PhaseDefinition {
                phase: AtoPhase::Phase3Weaponeering,
                duration_hours: 10.0,
                offset_hours: 14.0,
                active_agents: agents(&["ew_planner", "spectrum_manager"]),
                key_outputs: outputs(&["ew_missions", "frequency_allocations"]),
                critical: true,
            },
            PhaseDefinition {
                phase: AtoPhase::Phase4AtoProduction,
                duration_hours: 6.0,
                offset_hours: 24.0,
                active_agents: agents(&["ato_producer", "spectrum_manager"]),
                key_outputs: outputs(&["ato_document", "spins_annex"]),
                critical: true,
            },
            PhaseDefinition {
                phase: AtoPhase::Phase5Execution,
                duration_hours: 24.0,
                offset_hours: 30.0,
                active_agents: agents(&["spectrum_manager"]),
                key_outputs: outputs(&["execution_data", "real_time_adjustments"]),
                critical: false,
            },
            PhaseDefinition {
                phase: AtoPhase::Phase6Assessment,
                duration_hours: 18.0,
                offset_hours: 54.0,
                active_agents: agents(&["assessment"]),
                key_outputs: outputs(&["effectiveness_assessment", "lessons_learned"]),
                critical: false,
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_covers_72_hours() {
        let schedule = CycleSchedule::default();
        assert_eq!(schedule.total_hours(), 72.0);
    }

    #[test]
    fn phase_at_respects_offsets() {
        let schedule = CycleSchedule::default();
        assert_eq!(schedule.phase_at(0.0), Some(AtoPhase::Phase1Oeg));
        assert_eq!(schedule.phase_at(5.9), Some(AtoPhase::Phase1Oeg));
        assert_eq!(schedule.phase_at(6.0), Some(AtoPhase::Phase2TargetDevelopment));
        assert_eq!(schedule.phase_at(14.0), Some(AtoPhase::Phase3Weaponeering));
        assert_eq!(schedule.phase_at(29.9), Some(AtoPhase::Phase5Execution));
        assert_eq!(schedule.phase_at(54.0), Some(AtoPhase::Phase6Assessment));
        assert_eq!(schedule.phase_at(72.0), None);
    }

    #[test]
    fn critical_phases_match_schedule() {
        let schedule = CycleSchedule::default();
        for def in schedule.definitions() {
            assert_eq!(def.critical, def.phase.is_critical());
        }
    }
}
