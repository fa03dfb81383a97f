//! Token-budgeted context window builder.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use aether_access::AgentProfile;
use aether_broker::{InformationBroker, SourceRecord};
use aether_types::{
    AtoPhase, Clock, ContextElement, ElementKind, InformationCategory, Result,
};

use crate::element::{element_content, ElementIdGenerator};
use crate::template::template_for;
use crate::window::{AgentContext, ContextLayer};

/// What prompted a context refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    PhaseTransition,
    NewIntelligence,
    TaskChange,
    Manual,
}

/// Source of collaborative context: shared cycle artifacts visible to every
/// active agent. Implemented by the kernel over the orchestrator's cycle
/// outputs.
pub trait CollaborationSource: Send + Sync {
    fn shared_artifacts(&self) -> Vec<(String, serde_json::Value)>;
}

/// A collaboration source with nothing to share.
pub struct NoCollaboration;

impl CollaborationSource for NoCollaboration {
    fn shared_artifacts(&self) -> Vec<(String, serde_json::Value)> {
        Vec::new()
    }
}

type CacheKey = (String, AtoPhase, String);

/// Builds context windows per `(agent, phase, task)`, caching until a
/// refresh trigger fires.
pub struct ContextProvisioner {
    broker: Arc<InformationBroker>,
    collaboration: Arc<dyn CollaborationSource>,
    generator: ElementIdGenerator,
    clock: Arc<dyn Clock>,
    cache: RwLock<HashMap<CacheKey, AgentContext>>,
    /// Minimum doctrinal elements before the window is marked degraded.
    doctrinal_floor: usize,
}

impl ContextProvisioner {
    pub fn new(
        broker: Arc<InformationBroker>,
        collaboration: Arc<dyn CollaborationSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker,
            collaboration,
            generator: ElementIdGenerator::new(),
            clock,
            cache: RwLock::new(HashMap::new()),
            doctrinal_floor: 2,
        }
    }

    pub fn with_doctrinal_floor(mut self, floor: usize) -> Self {
        self.doctrinal_floor = floor;
        self
    }

    /// Build (or return the cached) context window for one task.
    pub async fn build(
        &self,
        profile: &AgentProfile,
        phase: AtoPhase,
        task: &str,
        max_tokens: u32,
    ) -> Result<AgentContext> {
        let key = (profile.id.clone(), phase, task.to_string());
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.token_budget == max_tokens {
                    return Ok(cached.clone());
                }
            }
        }

        let template = template_for(&profile.role, phase);
        let mut context = AgentContext::new(&profile.id, phase, task, max_tokens, self.clock.now());

        let doctrinal_budget = (max_tokens as f32 * template.split.doctrinal) as u32;
        let situational_budget = (max_tokens as f32 * template.split.situational) as u32;
        let historical_budget = (max_tokens as f32 * template.split.historical) as u32;
        let collaborative_budget = (max_tokens as f32 * template.split.collaborative) as u32;

        context.doctrinal = self
            .doctrinal_elements(profile, phase, task, &template.doctrine_priorities, doctrinal_budget)
            .await;
        context.situational = self
            .situational_elements(profile, phase, task, situational_budget)
            .await;
        context.historical = self
            .historical_elements(profile, phase, task, template.historical_depth, historical_budget)
            .await;
        context.collaborative = self.collaborative_elements(task, collaborative_budget);

        self.prune_to_budget(&mut context);

        if context.doctrinal.len() < self.doctrinal_floor {
            context.degraded = true;
        }

        context.check_invariants()?;

        tracing::info!(
            agent = %profile.id,
            phase = %phase,
            elements = context.element_count(),
            tokens = context.total_tokens(),
            budget = max_tokens,
            degraded = context.degraded,
            "context window built"
        );

        self.cache.write().await.insert(key, context.clone());
        Ok(context)
    }

    /// Drop cached windows for an agent (or all agents on new intelligence).
    pub async fn refresh(&self, agent_id: &str, trigger: RefreshTrigger) {
        let mut cache = self.cache.write().await;
        match trigger {
            RefreshTrigger::NewIntelligence => cache.clear(),
            _ => cache.retain(|(cached_agent, _, _), _| cached_agent != agent_id),
        }
        tracing::debug!(agent = agent_id, ?trigger, "context cache invalidated");
    }

    async fn doctrinal_elements(
        &self,
        profile: &AgentProfile,
        phase: AtoPhase,
        task: &str,
        priorities: &[String],
        budget: u32,
    ) -> Vec<ContextElement> {
        let mut records: Vec<SourceRecord> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for priority in priorities {
            let params = json!({
                "query": format!("{priority} {task}"),
                "top_k": 3,
            });
            if let Ok(response) = self
                .broker
                .query(profile, InformationCategory::Doctrine, &params, Some(phase))
                .await
            {
                // The same passage can match several priority queries.
                records.extend(
                    response
                        .records
                        .into_iter()
                        .filter(|r| seen.insert(r.id.clone())),
                );
            }
        }
        self.select(records, ElementKind::Doctrine, task, budget)
    }

    async fn situational_elements(
        &self,
        profile: &AgentProfile,
        phase: AtoPhase,
        task: &str,
        budget: u32,
    ) -> Vec<ContextElement> {
        let mut elements = Vec::new();
        let mut remaining = budget;

        let sources = [
            (InformationCategory::ThreatData, ElementKind::Threat),
            (InformationCategory::AssetStatus, ElementKind::Mission),
            (InformationCategory::MissionPlan, ElementKind::Mission),
            (InformationCategory::SpectrumAllocation, ElementKind::Mission),
        ];
        for (category, kind) in sources {
            if remaining == 0 {
                break;
            }
            if !profile.authorized_categories.contains(&category) {
                continue;
            }
            if let Ok(response) = self
                .broker
                .query(profile, category, &json!({}), Some(phase))
                .await
            {
                let picked = self.select(response.records, kind, task, remaining);
                let used: u32 = picked.iter().map(|e| e.tokens).sum();
                remaining = remaining.saturating_sub(used);
                elements.extend(picked);
            }
        }
        elements
    }

    async fn historical_elements(
        &self,
        profile: &AgentProfile,
        phase: AtoPhase,
        task: &str,
        depth: usize,
        budget: u32,
    ) -> Vec<ContextElement> {
        if depth == 0
            || !profile
                .authorized_categories
                .contains(&InformationCategory::ProcessMetrics)
        {
            return Vec::new();
        }
        let params = json!({"recent_cycles": depth});
        match self
            .broker
            .query(profile, InformationCategory::ProcessMetrics, &params, Some(phase))
            .await
        {
            Ok(response) => {
                let mut elements =
                    self.select(response.records, ElementKind::Historical, task, budget);
                elements.truncate(depth.max(1) * 3);
                elements
            }
            Err(_) => Vec::new(),
        }
    }

    fn collaborative_elements(&self, task: &str, budget: u32) -> Vec<ContextElement> {
        let records: Vec<SourceRecord> = self
            .collaboration
            .shared_artifacts()
            .into_iter()
            .map(|(name, value)| {
                SourceRecord::new(
                    name.clone(),
                    json!({"content": format!("{name}: {value}"), "artifact": name}),
                )
            })
            .collect();
        self.select(records, ElementKind::Collaborative, task, budget)
    }

    /// Greedy selection by descending relevance under a layer budget, with
    /// fresh prefix-typed IDs stamped on every element.
    fn select(
        &self,
        records: Vec<SourceRecord>,
        kind: ElementKind,
        task: &str,
        budget: u32,
    ) -> Vec<ContextElement> {
        let mut scored: Vec<(f32, SourceRecord)> = records
            .into_iter()
            .map(|record| {
                let content = element_content(&record.body);
                let overlap = keyword_overlap(task, &content);
                (0.5 * record.relevance + 0.5 * overlap, record)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut elements = Vec::new();
        let mut used = 0u32;
        for (score, record) in scored {
            let content = element_content(&record.body);
            let element = ContextElement::new(self.generator.next(kind), kind, content, score)
                .with_metadata(json!({"source_id": record.id, "body": record.body}));
            if used + element.tokens > budget {
                continue;
            }
            used += element.tokens;
            elements.push(element);
        }
        elements
    }

    /// Prune the window back under budget: collaborative first, doctrinal
    /// last, lowest relevance first. The doctrinal floor is held unless the
    /// budget makes that impossible.
    fn prune_to_budget(&self, context: &mut AgentContext) {
        for layer in ContextLayer::PRUNE_ORDER {
            while context.total_tokens() > context.token_budget {
                let elements = context.layer_mut(layer);
                if elements.is_empty() {
                    break;
                }
                if layer == ContextLayer::Doctrinal && elements.len() <= self.doctrinal_floor {
                    context.degraded = true;
                    break;
                }
                let lowest = elements
                    .iter()
                    .enumerate()
                    .min_by(|a, b| {
                        a.1.relevance_score
                            .partial_cmp(&b.1.relevance_score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| i);
                if let Some(index) = lowest {
                    elements.remove(index);
                }
            }
            if context.total_tokens() <= context.token_budget {
                break;
            }
        }

        // Budget smaller than the doctrinal floor itself: shed from the
        // floor rather than violate the budget invariant.
        while context.total_tokens() > context.token_budget && !context.doctrinal.is_empty() {
            context.degraded = true;
            context.doctrinal.pop();
        }
    }
}

fn keyword_overlap(task: &str, content: &str) -> f32 {
    let terms: Vec<String> = task
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() > 2)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(*t)).count();
    hits as f32 / terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use aether_access::{default_policies, default_profiles};
    use aether_broker::{
        AuditLog, BrokerBackends, MemoryAssetStore, MemoryMissionStore, MemoryOrgStore,
        MemoryMetricsStore, MemorySpectrumStore, MemoryThreatStore,
    };
    use aether_doctrine::{DoctrineKb, DoctrinePassage, MemoryDoctrineIndex};
    use aether_types::SystemClock;

    fn profile(id: &str) -> AgentProfile {
        default_profiles().into_iter().find(|p| p.id == id).unwrap()
    }

    async fn provisioner() -> ContextProvisioner {
        let index = MemoryDoctrineIndex::new();
        for i in 0..4 {
            index
                .insert(DoctrinePassage {
                    id: format!("passage-{i}"),
                    content: format!(
                        "mission planning guidance {i} for EW missions and asset assignment"
                    ),
                    source: "AFDP 3-85".to_string(),
                    metadata: json!({}),
                    score: 0.0,
                })
                .await;
        }

        let threats = MemoryThreatStore::new();
        for i in 0..3 {
            threats
                .insert(SourceRecord::new(
                    format!("T-{i}"),
                    json!({
                        "threat_type": "SAM",
                        "location": {"lat": 36.0 + i as f64, "lon": 44.0},
                    }),
                ))
                .await;
        }

        let broker = InformationBroker::new(
            default_policies(),
            Arc::new(DoctrineKb::new(Arc::new(index))),
            BrokerBackends {
                threat: Arc::new(threats),
                spectrum: Arc::new(MemorySpectrumStore::new()),
                asset: Arc::new(MemoryAssetStore::new()),
                mission: Arc::new(MemoryMissionStore::new()),
                org: Arc::new(MemoryOrgStore::new()),
                metrics: Arc::new(MemoryMetricsStore::new()),
            },
            Arc::new(AuditLog::new()),
            Arc::new(SystemClock),
        );

        ContextProvisioner::new(
            Arc::new(broker),
            Arc::new(NoCollaboration),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn window_respects_budget_and_invariants() {
        let provisioner = provisioner().await;
        let context = provisioner
            .build(
                &profile("ew_planner"),
                AtoPhase::Phase3Weaponeering,
                "plan EW missions against SAM sites",
                2000,
            )
            .await
            .unwrap();
        assert!(context.total_tokens() <= 2000);
        assert!(context.check_invariants().is_ok());
        assert!(!context.doctrinal.is_empty());
        assert!(!context.situational.is_empty());
    }

    #[tokio::test]
    async fn tight_budget_marks_degraded() {
        let provisioner = provisioner().await.with_doctrinal_floor(3);
        let context = provisioner
            .build(
                &profile("ew_planner"),
                AtoPhase::Phase3Weaponeering,
                "plan EW missions",
                40,
            )
            .await
            .unwrap();
        assert!(context.degraded);
        assert!(context.total_tokens() <= 40);
    }

    #[tokio::test]
    async fn cache_hits_until_refresh() {
        let provisioner = provisioner().await;
        let p = profile("ew_planner");
        let first = provisioner
            .build(&p, AtoPhase::Phase3Weaponeering, "plan EW missions", 2000)
            .await
            .unwrap();
        let second = provisioner
            .build(&p, AtoPhase::Phase3Weaponeering, "plan EW missions", 2000)
            .await
            .unwrap();
        // Cached: identical element IDs.
        assert_eq!(first.element_ids(), second.element_ids());

        provisioner.refresh("ew_planner", RefreshTrigger::TaskChange).await;
        let third = provisioner
            .build(&p, AtoPhase::Phase3Weaponeering, "plan EW missions", 2000)
            .await
            .unwrap();
        // Rebuilt: fresh IDs.
        assert_ne!(first.element_ids(), third.element_ids());
    }

    #[tokio::test]
    async fn unauthorized_layers_are_empty() {
        let provisioner = provisioner().await;
        // ato_producer has no threat-data authority.
        let context = provisioner
            .build(
                &profile("ato_producer"),
                AtoPhase::Phase4AtoProduction,
                "produce ATO EMS annex",
                2000,
            )
            .await
            .unwrap();
        assert!(context
            .situational
            .iter()
            .all(|e| e.kind != ElementKind::Threat));
    }
}
