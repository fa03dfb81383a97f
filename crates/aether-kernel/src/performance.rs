//! Per-agent performance digest.

use std::fmt::Write;

use aether_context::UtilizationTracker;
use aether_improvement::ImprovementLogger;

/// Render a performance report for one agent over the given cycles:
/// flag counts by type, time wasted, and context utilization.
pub fn report(
    improvement: &ImprovementLogger,
    tracker: &UtilizationTracker,
    agent_id: &str,
    cycle_ids: &[String],
) -> String {
    let flags: Vec<_> = improvement
        .flags_for_agent(agent_id)
        .into_iter()
        .filter(|f| cycle_ids.is_empty() || cycle_ids.contains(&f.cycle_id))
        .collect();

    let mut by_type: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for flag in &flags {
        *by_type.entry(flag.kind.to_string()).or_default() += 1;
    }
    let time_wasted: f64 = flags.iter().filter_map(|f| f.time_wasted_hours).sum();

    let utilization: Vec<f32> = tracker
        .reports()
        .into_iter()
        .filter(|r| r.agent_id == agent_id)
        .map(|r| r.utilization_rate)
        .collect();
    let avg_utilization = if utilization.is_empty() {
        None
    } else {
        Some(utilization.iter().sum::<f32>() / utilization.len() as f32)
    };

    let mut out = String::new();
    let _ = writeln!(out, "PERFORMANCE REPORT: {agent_id}");
    let _ = writeln!(out, "cycles considered: {}", cycle_ids.len());
    let _ = writeln!(out, "flags raised: {}", flags.len());
    let mut types: Vec<_> = by_type.into_iter().collect();
    types.sort_by(|a, b| b.1.cmp(&a.1));
    for (kind, count) in types {
        let _ = writeln!(out, "  - {kind}: {count}");
    }
    let _ = writeln!(out, "time wasted: {time_wasted:.1} hours");
    match avg_utilization {
        Some(rate) => {
            let _ = writeln!(out, "avg context utilization: {:.0}%", rate * 100.0);
        }
        None => {
            let _ = writeln!(out, "avg context utilization: no tracked responses");
        }
    }
    out
}
