//! Semantic utilization tracking.
//!
//! Two independent usage signals per element: literal ID citation in the
//! response text, and cosine similarity between element and response
//! embeddings when an embedder is configured. The embedding model itself is
//! external; the tracker only consumes vectors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::window::AgentContext;

/// Produces embeddings for free text. Implemented outside the core; absent
/// an embedder the tracker falls back to citation matching alone.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Usage computed for one agent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub agent_id: String,
    pub provisioned: usize,
    /// Element IDs cited literally in the response.
    pub cited: Vec<String>,
    /// Elements matched by embedding similarity, with their scores.
    pub semantic_matches: Vec<(String, f32)>,
    pub utilization_rate: f32,
    /// Provisioned elements with no usage signal.
    pub underutilized: Vec<String>,
}

/// Tracks context utilization across tasks.
pub struct UtilizationTracker {
    citation_pattern: Regex,
    similarity_threshold: f32,
    embedder: Option<Arc<dyn Embedder>>,
    history: RwLock<Vec<UsageReport>>,
    usage_counts: RwLock<HashMap<String, u64>>,
}

impl UtilizationTracker {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            citation_pattern: Regex::new(r"\b(?:DOC|THR|MSN|HIST|COLL)-[A-Za-z0-9_]+\b")
                .expect("citation pattern is valid"),
            similarity_threshold: 0.5,
            embedder,
            history: RwLock::new(Vec::new()),
            usage_counts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Extract element-ID citations from free text.
    pub fn extract_citations(&self, text: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.citation_pattern
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }

    /// Score the response against the provisioned context, update the
    /// context's `referenced` set and utilization rate, and record the
    /// report.
    pub fn track(&self, context: &mut AgentContext, response_text: &str) -> UsageReport {
        let provisioned_ids = context.element_ids();

        let cited: Vec<String> = self
            .extract_citations(response_text)
            .into_iter()
            .filter(|id| provisioned_ids.contains(id))
            .collect();

        let semantic_matches = self.semantic_matches(context, response_text);

        let mut used: std::collections::HashSet<String> = cited.iter().cloned().collect();
        used.extend(semantic_matches.iter().map(|(id, _)| id.clone()));

        for id in &used {
            context.mark_referenced(id);
        }

        let provisioned = provisioned_ids.len();
        let utilization_rate = if provisioned == 0 {
            0.0
        } else {
            used.len() as f32 / provisioned as f32
        };
        context.utilization_rate = utilization_rate;

        let mut underutilized: Vec<String> = provisioned_ids
            .iter()
            .filter(|id| !used.contains(*id))
            .cloned()
            .collect();
        underutilized.sort();

        {
            let mut counts = self.usage_counts.write().unwrap();
            for id in &used {
                *counts.entry(id.clone()).or_default() += 1;
            }
        }

        let report = UsageReport {
            agent_id: context.agent_id.clone(),
            provisioned,
            cited,
            semantic_matches,
            utilization_rate,
            underutilized,
        };

        tracing::info!(
            agent = %report.agent_id,
            citations = report.cited.len(),
            semantic = report.semantic_matches.len(),
            utilization = format!("{:.0}%", utilization_rate * 100.0),
            "context usage tracked"
        );

        self.history.write().unwrap().push(report.clone());
        report
    }

    fn semantic_matches(&self, context: &AgentContext, response_text: &str) -> Vec<(String, f32)> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        let Some(response_embedding) = embedder.embed(response_text) else {
            return Vec::new();
        };

        let mut matches: Vec<(String, f32)> = context
            .all_elements()
            .filter_map(|element| {
                let element_embedding = element
                    .embedding
                    .clone()
                    .or_else(|| embedder.embed(&element.content))?;
                let score = cosine_similarity(&response_embedding, &element_embedding);
                (score >= self.similarity_threshold).then(|| (element.id.clone(), score))
            })
            .collect();
        matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        matches
    }

    /// Average utilization across all tracked responses.
    pub fn average_utilization(&self) -> f32 {
        let history = self.history.read().unwrap();
        if history.is_empty() {
            return 0.0;
        }
        history.iter().map(|r| r.utilization_rate).sum::<f32>() / history.len() as f32
    }

    /// Per-element usage counts, most-used first.
    pub fn usage_counts(&self) -> Vec<(String, u64)> {
        let counts = self.usage_counts.read().unwrap();
        let mut out: Vec<(String, u64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1));
        out
    }

    pub fn reports(&self) -> Vec<UsageReport> {
        self.history.read().unwrap().clone()
    }

    /// Summary for feeding utilization back into template tuning.
    pub fn feedback_summary(&self) -> serde_json::Value {
        let history = self.history.read().unwrap();
        let total = history.len();
        let underutilized_total: usize = history.iter().map(|r| r.underutilized.len()).sum();
        serde_json::json!({
            "tracked_responses": total,
            "average_utilization": self.average_utilization(),
            "total_underutilized_elements": underutilized_total,
        })
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_types::{AtoPhase, ContextElement, ElementKind};
    use chrono::Utc;

    fn context_with_ten_elements() -> AgentContext {
        let mut ctx = AgentContext::new(
            "ew_planner",
            AtoPhase::Phase3Weaponeering,
            "plan EW missions",
            10_000,
            Utc::now(),
        );
        for i in 1..=5 {
            ctx.doctrinal.push(ContextElement::new(
                format!("DOC-{i}"),
                ElementKind::Doctrine,
                format!("doctrine passage {i}"),
                0.8,
            ));
            ctx.situational.push(ContextElement::new(
                format!("THR-{i}"),
                ElementKind::Threat,
                format!("threat {i}"),
                0.7,
            ));
        }
        ctx
    }

    #[test]
    fn citation_only_utilization() {
        let tracker = UtilizationTracker::new(None);
        let mut ctx = context_with_ten_elements();
        let report = tracker.track(
            &mut ctx,
            "Per [DOC-1], jammer placement avoids the SAM in THR-2.",
        );
        assert_eq!(report.provisioned, 10);
        assert_eq!(report.cited.len(), 2);
        assert!((report.utilization_rate - 0.2).abs() < 1e-6);
        assert_eq!(report.underutilized.len(), 8);
        assert!(ctx.referenced.contains("DOC-1"));
        assert!(ctx.referenced.contains("THR-2"));
        assert!(ctx.check_invariants().is_ok());
    }

    #[test]
    fn citations_outside_provisioned_set_ignored() {
        let tracker = UtilizationTracker::new(None);
        let mut ctx = context_with_ten_elements();
        let report = tracker.track(&mut ctx, "See DOC-999 and MSN-4 for detail.");
        assert!(report.cited.is_empty());
        assert_eq!(report.utilization_rate, 0.0);
    }

    struct KeywordEmbedder;

    impl Embedder for KeywordEmbedder {
        // One axis per keyword; enough to exercise cosine matching.
        fn embed(&self, text: &str) -> Option<Vec<f32>> {
            let lower = text.to_lowercase();
            Some(vec![
                lower.contains("jamming") as u8 as f32,
                lower.contains("doctrine") as u8 as f32,
                lower.contains("threat") as u8 as f32,
            ])
        }
    }

    #[test]
    fn semantic_signal_counts_without_citation() {
        let tracker = UtilizationTracker::new(Some(Arc::new(KeywordEmbedder)));
        let mut ctx = AgentContext::new(
            "ew_planner",
            AtoPhase::Phase3Weaponeering,
            "task",
            10_000,
            Utc::now(),
        );
        ctx.doctrinal.push(ContextElement::new(
            "DOC-1",
            ElementKind::Doctrine,
            "jamming doctrine",
            0.9,
        ));
        ctx.situational.push(ContextElement::new(
            "THR-1",
            ElementKind::Threat,
            "threat emitter",
            0.9,
        ));

        let report = tracker.track(&mut ctx, "The plan applies jamming doctrine.");
        assert!(report.cited.is_empty());
        assert!(report
            .semantic_matches
            .iter()
            .any(|(id, _)| id == "DOC-1"));
        assert!(ctx.referenced.contains("DOC-1"));
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
