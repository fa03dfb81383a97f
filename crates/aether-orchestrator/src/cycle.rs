//! Cycle state.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use aether_types::AtoPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Active,
    Completed,
    Cancelled,
}

/// Record of an explicit phase-skip override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub from: AtoPhase,
    pub to: AtoPhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// One ATO cycle. Exactly one cycle is current at any instant; completed
/// cycles are read-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtoCycle {
    pub cycle_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub current_phase: Option<AtoPhase>,
    pub phase_started_at: DateTime<Utc>,
    pub phase_history: Vec<(AtoPhase, DateTime<Utc>)>,
    pub outputs: HashMap<String, serde_json::Value>,
    pub skip_records: Vec<SkipRecord>,
    pub status: CycleStatus,
}

impl AtoCycle {
    pub fn new(cycle_id: &str, start_time: DateTime<Utc>, total_hours: f64) -> Self {
        Self {
            cycle_id: cycle_id.to_string(),
            start_time,
            end_time: start_time + Duration::milliseconds((total_hours * 3_600_000.0) as i64),
            current_phase: Some(AtoPhase::Phase1Oeg),
            phase_started_at: start_time,
            phase_history: vec![(AtoPhase::Phase1Oeg, start_time)],
            outputs: HashMap::new(),
            skip_records: Vec::new(),
            status: CycleStatus::Active,
        }
    }

    pub fn enter_phase(&mut self, phase: AtoPhase, at: DateTime<Utc>) {
        self.current_phase = Some(phase);
        self.phase_started_at = at;
        self.phase_history.push((phase, at));
    }

    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.current_phase = None;
        self.status = CycleStatus::Completed;
        self.phase_started_at = at;
    }

    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "cycle_id": self.cycle_id,
            "start_time": self.start_time.to_rfc3339(),
            "end_time": self.end_time.to_rfc3339(),
            "current_phase": self.current_phase.map(|p| p.to_string()),
            "status": self.status,
            "phase_history": self
                .phase_history
                .iter()
                .map(|(phase, at)| {
                    serde_json::json!({"phase": phase.to_string(), "at": at.to_rfc3339()})
                })
                .collect::<Vec<_>>(),
            "outputs": self.outputs.keys().collect::<Vec<_>>(),
            "skips": self.skip_records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_history_tracks_entries() {
        let start = Utc::now();
        let mut cycle = AtoCycle::new("C1", start, 72.0);
        cycle.enter_phase(AtoPhase::Phase2TargetDevelopment, start + Duration::hours(6));
        assert_eq!(cycle.phase_history.len(), 2);
        assert_eq!(cycle.phase_history[0].0, AtoPhase::Phase1Oeg);
        assert_eq!(cycle.phase_history[1].0, AtoPhase::Phase2TargetDevelopment);
    }

    #[test]
    fn end_time_matches_total_hours() {
        let start = Utc::now();
        let cycle = AtoCycle::new("C1", start, 72.0);
        assert_eq!((cycle.end_time - start).num_hours(), 72);
    }
}
