//! ATO cycle orchestrator.
//!
//! A deterministic, time-driven state machine over the six cycle phases.
//! The due phase is always derived from `now - cycle.start_time` against the
//! schedule's offset table, never from accumulated deltas, so repeated ticks
//! with the same timestamp converge instead of double-advancing.

pub mod cycle;
pub mod schedule;

pub use cycle::{AtoCycle, CycleStatus, SkipRecord};
pub use schedule::{CycleSchedule, PhaseDefinition};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use aether_types::{AetherError, AtoPhase, Clock, Result};

/// A phase boundary event delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub kind: PhaseEventKind,
    pub phase: AtoPhase,
    pub cycle_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEventKind {
    Entered,
    Exited,
}

/// Subscribers run synchronously, in registration order, on every
/// transition. A failing handler is reported and skipped, never fatal.
pub type PhaseHandler = Box<dyn Fn(&PhaseEvent) -> std::result::Result<(), String> + Send + Sync>;

struct OrchestratorState {
    current: Option<AtoCycle>,
    history: Vec<AtoCycle>,
    cycle_counter: u32,
}

/// Owns the current cycle and drives phase transitions by wall clock or
/// explicit advance.
pub struct CycleOrchestrator {
    schedule: CycleSchedule,
    clock: Arc<dyn Clock>,
    state: Mutex<OrchestratorState>,
    handlers: Mutex<Vec<PhaseHandler>>,
}

impl CycleOrchestrator {
    pub fn new(schedule: CycleSchedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            schedule,
            clock,
            state: Mutex::new(OrchestratorState {
                current: None,
                history: Vec::new(),
                cycle_counter: 0,
            }),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn schedule(&self) -> &CycleSchedule {
        &self.schedule
    }

    pub fn subscribe(&self, handler: PhaseHandler) {
        self.handlers.lock().unwrap().push(handler);
    }

    /// Start a new cycle at PHASE1. Fails while another cycle is active.
    pub fn start_cycle(&self, cycle_id: &str) -> Result<AtoCycle> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let snapshot;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(current) = &state.current {
                if current.status == CycleStatus::Active {
                    return Err(AetherError::AlreadyActive {
                        cycle_id: current.cycle_id.clone(),
                    });
                }
            }
            state.cycle_counter += 1;
            let cycle = AtoCycle::new(cycle_id, now, self.schedule.total_hours());
            events.push(PhaseEvent {
                kind: PhaseEventKind::Entered,
                phase: AtoPhase::Phase1Oeg,
                cycle_id: cycle.cycle_id.clone(),
                at: now,
            });
            tracing::info!(cycle = cycle_id, "started ATO cycle");
            snapshot = cycle.clone();
            state.current = Some(cycle);
        }
        self.dispatch(&events);
        Ok(snapshot)
    }

    pub fn current_phase(&self) -> Option<AtoPhase> {
        let state = self.state.lock().unwrap();
        state.current.as_ref().and_then(|c| c.current_phase)
    }

    pub fn current_cycle_id(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.current.as_ref().map(|c| c.cycle_id.clone())
    }

    pub fn current_cycle(&self) -> Option<AtoCycle> {
        self.state.lock().unwrap().current.clone()
    }

    /// Agents that should be active in the current phase.
    pub fn active_agents(&self) -> Vec<String> {
        match self.current_phase() {
            Some(phase) => self.schedule.definition(phase).active_agents.clone(),
            None => Vec::new(),
        }
    }

    pub fn is_agent_active(&self, agent_id: &str) -> bool {
        self.active_agents().iter().any(|a| a == agent_id)
    }

    /// Move to the next phase in the transition graph. From PHASE6 this is
    /// the restart edge: the cycle completes into history and a fresh,
    /// auto-numbered cycle opens at PHASE1.
    pub fn advance(&self) -> Result<AtoPhase> {
        let now = self.clock.now();
        let mut events = Vec::new();
        let entered;
        {
            let mut state = self.state.lock().unwrap();
            let cycle = state.current.as_mut().ok_or(AetherError::IllegalTransition {
                from: AtoPhase::Phase1Oeg,
                to: AtoPhase::Phase1Oeg,
            })?;
            let from = cycle.current_phase.ok_or(AetherError::IllegalTransition {
                from: AtoPhase::Phase1Oeg,
                to: AtoPhase::Phase1Oeg,
            })?;

            events.push(PhaseEvent {
                kind: PhaseEventKind::Exited,
                phase: from,
                cycle_id: cycle.cycle_id.clone(),
                at: now,
            });

            if from == AtoPhase::Phase6Assessment {
                cycle.complete(now);
                let finished = state.current.take().unwrap();
                state.history.push(finished);
                state.cycle_counter += 1;
                let cycle_id = format!("ATO-{:04}", state.cycle_counter);
                let fresh = AtoCycle::new(&cycle_id, now, self.schedule.total_hours());
                events.push(PhaseEvent {
                    kind: PhaseEventKind::Entered,
                    phase: AtoPhase::Phase1Oeg,
                    cycle_id: fresh.cycle_id.clone(),
                    at: now,
                });
                state.current = Some(fresh);
                entered = AtoPhase::Phase1Oeg;
            } else {
                let to = from.next();
                cycle.enter_phase(to, now);
                events.push(PhaseEvent {
                    kind: PhaseEventKind::Entered,
                    phase: to,
                    cycle_id: cycle.cycle_id.clone(),
                    at: now,
                });
                entered = to;
            }
        }
        self.dispatch(&events);
        Ok(entered)
    }

    /// Jump forward to `target`, skipping intermediate phases. Critical
    /// phases may never be skipped; non-critical skips record an override.
    pub fn skip_to(&self, target: AtoPhase, override_reason: &str) -> Result<AtoPhase> {
        let now = self.clock.now();
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let cycle = state.current.as_mut().ok_or(AetherError::IllegalTransition {
                from: AtoPhase::Phase1Oeg,
                to: target,
            })?;
            let from = cycle.current_phase.ok_or(AetherError::IllegalTransition {
                from: AtoPhase::Phase1Oeg,
                to: target,
            })?;

            if target.index() <= from.index() {
                return Err(AetherError::IllegalTransition { from, to: target });
            }

            let skipped: Vec<AtoPhase> = AtoPhase::ALL
                [from.index() + 1..target.index()]
                .to_vec();
            if let Some(critical) = skipped.iter().find(|p| p.is_critical()) {
                tracing::warn!(
                    from = %from,
                    to = %target,
                    critical = %critical,
                    "refused skip over critical phase"
                );
                return Err(AetherError::IllegalTransition { from, to: target });
            }

            cycle.skip_records.push(SkipRecord {
                from,
                to: target,
                reason: override_reason.to_string(),
                at: now,
            });
            events.push(PhaseEvent {
                kind: PhaseEventKind::Exited,
                phase: from,
                cycle_id: cycle.cycle_id.clone(),
                at: now,
            });
            cycle.enter_phase(target, now);
            events.push(PhaseEvent {
                kind: PhaseEventKind::Entered,
                phase: target,
                cycle_id: cycle.cycle_id.clone(),
                at: now,
            });
            tracing::info!(from = %from, to = %target, reason = override_reason, "phase skip");
        }
        self.dispatch(&events);
        Ok(target)
    }

    /// Drive time-based transitions. Emits one exited/entered pair per due
    /// boundary, walking through every intermediate phase in order. Calling
    /// again with the same `now` emits nothing.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<PhaseEvent> {
        let mut events = Vec::new();
        {
            let mut state = self.state.lock().unwrap();
            let Some(cycle) = state.current.as_mut() else {
                return events;
            };
            if cycle.status != CycleStatus::Active {
                return events;
            }

            let elapsed_hours =
                (now - cycle.start_time).num_milliseconds() as f64 / 3_600_000.0;

            if elapsed_hours < 0.0 {
                // Clock skew behind cycle start; nothing is due.
                return events;
            }

            let due = self.schedule.phase_at(elapsed_hours);

            match due {
                Some(due_phase) => {
                    while let Some(current) = cycle.current_phase {
                        if current == due_phase {
                            break;
                        }
                        events.push(PhaseEvent {
                            kind: PhaseEventKind::Exited,
                            phase: current,
                            cycle_id: cycle.cycle_id.clone(),
                            at: now,
                        });
                        let next = current.next();
                        cycle.enter_phase(next, now);
                        events.push(PhaseEvent {
                            kind: PhaseEventKind::Entered,
                            phase: next,
                            cycle_id: cycle.cycle_id.clone(),
                            at: now,
                        });
                    }
                }
                None => {
                    // Past the end of the cycle: complete it.
                    if let Some(current) = cycle.current_phase {
                        events.push(PhaseEvent {
                            kind: PhaseEventKind::Exited,
                            phase: current,
                            cycle_id: cycle.cycle_id.clone(),
                            at: now,
                        });
                    }
                    cycle.complete(now);
                    let finished = state.current.take().unwrap();
                    tracing::info!(cycle = %finished.cycle_id, "ATO cycle completed");
                    state.history.push(finished);
                }
            }
        }
        self.dispatch(&events);
        events
    }

    /// Record an output for the current cycle, keyed by name.
    pub fn record_output(&self, name: &str, value: serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let cycle = state
            .current
            .as_mut()
            .ok_or_else(|| AetherError::invariant("no active cycle to record output"))?;
        cycle.outputs.insert(name.to_string(), value);
        Ok(())
    }

    /// Outputs of the current cycle.
    pub fn current_outputs(&self) -> Vec<(String, serde_json::Value)> {
        let state = self.state.lock().unwrap();
        state
            .current
            .as_ref()
            .map(|c| c.outputs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Completed and cancelled cycles, oldest first.
    pub fn history(&self) -> Vec<AtoCycle> {
        self.state.lock().unwrap().history.clone()
    }

    /// Summary of the named cycle, or the current one.
    pub fn cycle_summary(&self, cycle_id: Option<&str>) -> Option<serde_json::Value> {
        let state = self.state.lock().unwrap();
        let cycle = match cycle_id {
            Some(id) => state
                .current
                .as_ref()
                .filter(|c| c.cycle_id == id)
                .or_else(|| state.history.iter().find(|c| c.cycle_id == id)),
            None => state.current.as_ref(),
        }?;
        Some(cycle.summary())
    }

    fn dispatch(&self, events: &[PhaseEvent]) {
        if events.is_empty() {
            return;
        }
        let handlers = self.handlers.lock().unwrap();
        for event in events {
            for (index, handler) in handlers.iter().enumerate() {
                if let Err(error) = handler(event) {
                    tracing::error!(
                        handler = index,
                        phase = %event.phase,
                        %error,
                        "phase handler failed"
                    );
                }
            }
        }
    }

    /// Hours until the current phase's scheduled end, from `now`.
    pub fn hours_remaining_in_phase(&self, now: DateTime<Utc>) -> Option<f64> {
        let state = self.state.lock().unwrap();
        let cycle = state.current.as_ref()?;
        let phase = cycle.current_phase?;
        let def = self.schedule.definition(phase);
        let phase_end = cycle.start_time
            + Duration::milliseconds(((def.offset_hours + def.duration_hours) * 3_600_000.0) as i64);
        Some((phase_end - now).num_milliseconds() as f64 / 3_600_000.0)
    }
}
