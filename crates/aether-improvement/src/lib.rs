//! Process-improvement subsystem.
//!
//! Agents follow doctrine exactly, but every doctrinal procedure is
//! instrumented: deviations from expected timing, missing information,
//! redundant coordination, and the rest of the taxonomy are recorded as
//! append-only flags. Pattern mining across cycles turns recurring flags
//! into recommendations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aether_types::{AtoPhase, Clock};

/// Closed taxonomy of process inefficiencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InefficiencyType {
    RedundantCoordination,
    InformationGap,
    TimingConstraint,
    DoctrineContradiction,
    AutomationOpportunity,
    DeconflictionIssue,
    ResourceBottleneck,
}

impl std::fmt::Display for InefficiencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::RedundantCoordination => "redundant_coordination",
            Self::InformationGap => "information_gap",
            Self::TimingConstraint => "timing_constraint",
            Self::DoctrineContradiction => "doctrine_contradiction",
            Self::AutomationOpportunity => "automation_opportunity",
            Self::DeconflictionIssue => "deconfliction_issue",
            Self::ResourceBottleneck => "resource_bottleneck",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One flagged deviation. Append-only; `seq` is strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessImprovementFlag {
    pub id: String,
    pub seq: u64,
    pub cycle_id: String,
    pub phase: AtoPhase,
    pub agent_id: String,
    pub workflow: String,
    pub kind: InefficiencyType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_wasted_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_improvement: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

/// Thresholds for the auto-flag rules. The source material disagrees on
/// exact values; these defaults are representative and overridable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagThresholds {
    /// Elapsed/expected ratio above which a procedure is flagged.
    pub timing_ratio: f64,
    /// Round-trips to the same agent for one decision before flagging.
    pub coordination_roundtrips: usize,
    /// Manual step count above which an automatable pattern is flagged.
    pub manual_steps: usize,
    /// Spectrum conflicts per cycle before flagging deconfliction.
    pub spectrum_conflicts_per_cycle: usize,
    /// Asset-reservation denials per cycle before flagging a bottleneck.
    pub reservation_denials_per_cycle: usize,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            timing_ratio: 1.3,
            coordination_roundtrips: 3,
            manual_steps: 5,
            spectrum_conflicts_per_cycle: 3,
            reservation_denials_per_cycle: 3,
        }
    }
}

/// A mined recurrence of flags sharing `(workflow, kind)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub pattern_id: String,
    pub workflow: String,
    pub kind: InefficiencyType,
    pub occurrences: usize,
    pub cycle_span: usize,
    pub total_time_wasted_hours: f64,
    pub evidence: Vec<String>,
    pub suggested_action: String,
    pub priority: Severity,
}

/// Input for a full-form flag.
#[derive(Debug, Clone)]
pub struct FlagRequest {
    pub cycle_id: String,
    pub phase: AtoPhase,
    pub agent_id: String,
    pub workflow: String,
    pub kind: InefficiencyType,
    pub description: String,
    pub time_wasted_hours: Option<f64>,
    pub suggested_improvement: Option<String>,
    pub severity: Severity,
}

/// Append-only flag log with auto-flag rules and pattern mining.
pub struct ImprovementLogger {
    flags: RwLock<Vec<ProcessImprovementFlag>>,
    seq: AtomicU64,
    pattern_counter: AtomicU64,
    thresholds: FlagThresholds,
    clock: Arc<dyn Clock>,
}

impl ImprovementLogger {
    pub fn new(thresholds: FlagThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            flags: RwLock::new(Vec::new()),
            seq: AtomicU64::new(0),
            pattern_counter: AtomicU64::new(0),
            thresholds,
            clock,
        }
    }

    pub fn thresholds(&self) -> &FlagThresholds {
        &self.thresholds
    }

    /// Record a flag. Returns the stored copy with its id and sequence.
    pub fn flag(&self, request: FlagRequest) -> ProcessImprovementFlag {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let flag = ProcessImprovementFlag {
            id: format!("FLAG-{seq:06}"),
            seq,
            cycle_id: request.cycle_id,
            phase: request.phase,
            agent_id: request.agent_id,
            workflow: request.workflow,
            kind: request.kind,
            description: request.description,
            time_wasted_hours: request.time_wasted_hours,
            suggested_improvement: request.suggested_improvement,
            severity: request.severity,
            created_at: self.clock.now(),
        };
        tracing::warn!(
            kind = %flag.kind,
            agent = %flag.agent_id,
            workflow = %flag.workflow,
            "process inefficiency flagged: {}",
            flag.description
        );
        self.flags.write().unwrap().push(flag.clone());
        flag
    }

    /// Apply the timing rule to a completed (or cancelled) procedure.
    /// Returns the flag when one was raised.
    #[allow(clippy::too_many_arguments)]
    pub fn record_procedure_timing(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        workflow: &str,
        expected_hours: f64,
        elapsed_hours: f64,
        cancelled: bool,
    ) -> Option<ProcessImprovementFlag> {
        if cancelled {
            return Some(self.flag(FlagRequest {
                cycle_id: cycle_id.to_string(),
                phase,
                agent_id: agent_id.to_string(),
                workflow: workflow.to_string(),
                kind: InefficiencyType::TimingConstraint,
                description: format!(
                    "procedure '{workflow}' cancelled after {elapsed_hours:.2}h \
                     (expected {expected_hours:.2}h): cancelled"
                ),
                time_wasted_hours: Some(elapsed_hours),
                suggested_improvement: Some(format!(
                    "revisit the timeline or preconditions for '{workflow}'"
                )),
                severity: Severity::High,
            }));
        }

        if expected_hours <= 0.0 || elapsed_hours <= expected_hours * self.thresholds.timing_ratio
        {
            return None;
        }

        let time_wasted = elapsed_hours - expected_hours;
        let overrun_pct = (elapsed_hours / expected_hours - 1.0) * 100.0;
        Some(self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: workflow.to_string(),
            kind: InefficiencyType::TimingConstraint,
            description: format!(
                "procedure '{workflow}' took {elapsed_hours:.2}h vs expected \
                 {expected_hours:.2}h ({overrun_pct:.1}% over)"
            ),
            time_wasted_hours: Some(time_wasted),
            suggested_improvement: Some(format!(
                "adjust doctrine timeline for '{workflow}' or identify automation opportunities"
            )),
            severity: if time_wasted < 2.0 {
                Severity::Medium
            } else {
                Severity::High
            },
        }))
    }

    pub fn flag_information_gap(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        workflow: &str,
        missing: &str,
    ) -> ProcessImprovementFlag {
        self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: workflow.to_string(),
            kind: InefficiencyType::InformationGap,
            description: format!("missing information: {missing}"),
            time_wasted_hours: None,
            suggested_improvement: Some(format!("grant direct access to: {missing}")),
            severity: Severity::Medium,
        })
    }

    /// Flag repeated round-trips to the same agent once the threshold is met.
    #[allow(clippy::too_many_arguments)]
    pub fn record_coordination_roundtrips(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        workflow: &str,
        peer: &str,
        roundtrips: usize,
        time_wasted_hours: f64,
    ) -> Option<ProcessImprovementFlag> {
        if roundtrips < self.thresholds.coordination_roundtrips {
            return None;
        }
        Some(self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: workflow.to_string(),
            kind: InefficiencyType::RedundantCoordination,
            description: format!(
                "{roundtrips} coordination round-trips with {peer} for one decision"
            ),
            time_wasted_hours: Some(time_wasted_hours),
            suggested_improvement: Some(
                "consolidate approval steps or implement automated coordination".to_string(),
            ),
            severity: if time_wasted_hours < 1.0 {
                Severity::Medium
            } else {
                Severity::High
            },
        }))
    }

    pub fn flag_doctrine_contradiction(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        workflow: &str,
        first_citation: &str,
        second_citation: &str,
    ) -> ProcessImprovementFlag {
        self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: workflow.to_string(),
            kind: InefficiencyType::DoctrineContradiction,
            description: format!(
                "contradictory doctrine guidance: {first_citation} vs {second_citation}"
            ),
            time_wasted_hours: None,
            suggested_improvement: Some("requires doctrine update or clarification".to_string()),
            severity: Severity::High,
        })
    }

    pub fn record_manual_steps(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        workflow: &str,
        steps: usize,
    ) -> Option<ProcessImprovementFlag> {
        if steps < self.thresholds.manual_steps {
            return None;
        }
        Some(self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: workflow.to_string(),
            kind: InefficiencyType::AutomationOpportunity,
            description: format!("{steps} manual steps in an automatable pattern"),
            time_wasted_hours: None,
            suggested_improvement: Some(format!("automate '{workflow}'")),
            severity: Severity::Medium,
        }))
    }

    pub fn record_spectrum_conflicts(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        conflicts: usize,
    ) -> Option<ProcessImprovementFlag> {
        if conflicts < self.thresholds.spectrum_conflicts_per_cycle {
            return None;
        }
        Some(self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: "spectrum_deconfliction".to_string(),
            kind: InefficiencyType::DeconflictionIssue,
            description: format!("{conflicts} spectrum conflicts within one cycle"),
            time_wasted_hours: None,
            suggested_improvement: Some(
                "consider pre-allocation or enhanced coordination tools".to_string(),
            ),
            severity: Severity::High,
        }))
    }

    pub fn record_reservation_denials(
        &self,
        cycle_id: &str,
        phase: AtoPhase,
        agent_id: &str,
        denials: usize,
    ) -> Option<ProcessImprovementFlag> {
        if denials < self.thresholds.reservation_denials_per_cycle {
            return None;
        }
        Some(self.flag(FlagRequest {
            cycle_id: cycle_id.to_string(),
            phase,
            agent_id: agent_id.to_string(),
            workflow: "asset_reservation".to_string(),
            kind: InefficiencyType::ResourceBottleneck,
            description: format!("{denials} asset-reservation denials within one cycle"),
            time_wasted_hours: None,
            suggested_improvement: Some(
                "requires resource reallocation or timeline adjustment".to_string(),
            ),
            severity: Severity::High,
        }))
    }

    pub fn flags(&self) -> Vec<ProcessImprovementFlag> {
        self.flags.read().unwrap().clone()
    }

    pub fn flags_for_cycle(&self, cycle_id: &str) -> Vec<ProcessImprovementFlag> {
        self.flags
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.cycle_id == cycle_id)
            .cloned()
            .collect()
    }

    pub fn flags_for_agent(&self, agent_id: &str) -> Vec<ProcessImprovementFlag> {
        self.flags
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Mine recurring `(workflow, kind)` groups into recommendations.
    ///
    /// A group qualifies when it has at least `min_occurrences` flags or its
    /// flags span at least `min_cycle_span` distinct cycles.
    pub fn analyze_patterns(
        &self,
        min_occurrences: usize,
        min_cycle_span: usize,
    ) -> Vec<Recommendation> {
        let flags = self.flags.read().unwrap();
        let mut grouped: HashMap<(String, InefficiencyType), Vec<&ProcessImprovementFlag>> =
            HashMap::new();
        for flag in flags.iter() {
            grouped
                .entry((flag.workflow.clone(), flag.kind))
                .or_default()
                .push(flag);
        }

        let mut recommendations = Vec::new();
        for ((workflow, kind), group) in grouped {
            let cycles: std::collections::HashSet<&str> =
                group.iter().map(|f| f.cycle_id.as_str()).collect();
            if group.len() < min_occurrences && cycles.len() < min_cycle_span {
                continue;
            }

            let total_time: f64 = group.iter().filter_map(|f| f.time_wasted_hours).sum();
            let pattern_seq = self.pattern_counter.fetch_add(1, Ordering::SeqCst) + 1;
            recommendations.push(Recommendation {
                pattern_id: format!("PATTERN-{pattern_seq:04}"),
                workflow: workflow.clone(),
                kind,
                occurrences: group.len(),
                cycle_span: cycles.len(),
                total_time_wasted_hours: total_time,
                evidence: group.iter().map(|f| f.id.clone()).collect(),
                suggested_action: suggest_action(&workflow, kind, group.len()),
                priority: if group.len() >= 10 || total_time >= 10.0 {
                    Severity::High
                } else if group.len() >= 5 || total_time >= 5.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                },
            });
        }

        recommendations.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.occurrences.cmp(&a.occurrences))
        });
        tracing::info!(patterns = recommendations.len(), "pattern analysis complete");
        recommendations
    }

    /// Summary counts for operator surfaces.
    pub fn summary(&self) -> serde_json::Value {
        let flags = self.flags.read().unwrap();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        let mut by_agent: HashMap<String, usize> = HashMap::new();
        for flag in flags.iter() {
            *by_type.entry(flag.kind.to_string()).or_default() += 1;
            *by_agent.entry(flag.agent_id.clone()).or_default() += 1;
        }
        let total_time: f64 = flags.iter().filter_map(|f| f.time_wasted_hours).sum();
        serde_json::json!({
            "total_flags": flags.len(),
            "by_type": by_type,
            "by_agent": by_agent,
            "total_time_wasted_hours": total_time,
        })
    }

    /// Human-readable process-improvement report.
    pub fn report(&self, min_occurrences: usize, min_cycle_span: usize) -> String {
        use std::fmt::Write;

        let summary = self.summary();
        let recommendations = self.analyze_patterns(min_occurrences, min_cycle_span);

        let mut out = String::new();
        let _ = writeln!(out, "PROCESS IMPROVEMENT REPORT");
        let _ = writeln!(out, "==========================");
        let _ = writeln!(out, "Total flags: {}", summary["total_flags"]);
        let _ = writeln!(
            out,
            "Total time wasted: {:.1} hours",
            summary["total_time_wasted_hours"].as_f64().unwrap_or(0.0)
        );
        let _ = writeln!(out, "Patterns identified: {}", recommendations.len());
        for rec in &recommendations {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{} [{:?}] {} / {}",
                rec.pattern_id, rec.priority, rec.workflow, rec.kind
            );
            let _ = writeln!(
                out,
                "  occurrences: {} across {} cycle(s), {:.1}h wasted",
                rec.occurrences, rec.cycle_span, rec.total_time_wasted_hours
            );
            let _ = writeln!(out, "  action: {}", rec.suggested_action);
            let _ = writeln!(out, "  evidence: {}", rec.evidence.join(", "));
        }
        out
    }
}

fn suggest_action(workflow: &str, kind: InefficiencyType, occurrences: usize) -> String {
    match kind {
        InefficiencyType::RedundantCoordination => format!(
            "streamline coordination in '{workflow}': consolidate {occurrences} redundant \
             approval steps or introduce a single approval authority"
        ),
        InefficiencyType::InformationGap => format!(
            "address information gap in '{workflow}': grant direct access to the missing \
             sources or pre-populate them at workflow start ({occurrences} occurrences)"
        ),
        InefficiencyType::TimingConstraint => format!(
            "adjust the timeline for '{workflow}': execution exceeded the expected time \
             in {occurrences} instances"
        ),
        InefficiencyType::DoctrineContradiction => format!(
            "resolve contradictory guidance in '{workflow}': conflicting passages detected \
             {occurrences} times; requires doctrine update"
        ),
        InefficiencyType::AutomationOpportunity => format!(
            "automate '{workflow}': manual process repeated {occurrences} times with \
             consistent inputs"
        ),
        InefficiencyType::DeconflictionIssue => format!(
            "improve spectrum deconfliction in '{workflow}': {occurrences} recurring \
             conflicts; consider pre-allocation"
        ),
        InefficiencyType::ResourceBottleneck => format!(
            "address resource bottleneck in '{workflow}': shortfalls detected {occurrences} \
             times; requires reallocation or timeline adjustment"
        ),
    }
}
