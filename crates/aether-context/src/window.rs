//! The per-task context window.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aether_types::{AetherError, AtoPhase, ContextElement, Result};

/// The four context layers, in prune order from most to least expendable
/// when reversed: pruning removes collaborative first, doctrinal last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLayer {
    Doctrinal,
    Situational,
    Historical,
    Collaborative,
}

impl ContextLayer {
    pub const ALL: [ContextLayer; 4] = [
        Self::Doctrinal,
        Self::Situational,
        Self::Historical,
        Self::Collaborative,
    ];

    /// Layers in the order they are pruned under budget pressure.
    pub const PRUNE_ORDER: [ContextLayer; 4] = [
        Self::Collaborative,
        Self::Historical,
        Self::Situational,
        Self::Doctrinal,
    ];
}

/// A bounded, phase-templated context window for one agent task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub phase: AtoPhase,
    pub task: String,
    pub doctrinal: Vec<ContextElement>,
    pub situational: Vec<ContextElement>,
    pub historical: Vec<ContextElement>,
    pub collaborative: Vec<ContextElement>,
    pub token_budget: u32,
    /// Element IDs the agent demonstrably used. Always a subset of the
    /// provisioned IDs.
    pub referenced: HashSet<String>,
    pub utilization_rate: f32,
    /// Set when the doctrinal floor could not be met.
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
    pub last_refresh: DateTime<Utc>,
}

impl AgentContext {
    pub fn new(
        agent_id: impl Into<String>,
        phase: AtoPhase,
        task: impl Into<String>,
        token_budget: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            phase,
            task: task.into(),
            doctrinal: Vec::new(),
            situational: Vec::new(),
            historical: Vec::new(),
            collaborative: Vec::new(),
            token_budget,
            referenced: HashSet::new(),
            utilization_rate: 0.0,
            degraded: false,
            created_at: at,
            last_refresh: at,
        }
    }

    pub fn layer(&self, layer: ContextLayer) -> &Vec<ContextElement> {
        match layer {
            ContextLayer::Doctrinal => &self.doctrinal,
            ContextLayer::Situational => &self.situational,
            ContextLayer::Historical => &self.historical,
            ContextLayer::Collaborative => &self.collaborative,
        }
    }

    pub fn layer_mut(&mut self, layer: ContextLayer) -> &mut Vec<ContextElement> {
        match layer {
            ContextLayer::Doctrinal => &mut self.doctrinal,
            ContextLayer::Situational => &mut self.situational,
            ContextLayer::Historical => &mut self.historical,
            ContextLayer::Collaborative => &mut self.collaborative,
        }
    }

    pub fn all_elements(&self) -> impl Iterator<Item = &ContextElement> {
        self.doctrinal
            .iter()
            .chain(&self.situational)
            .chain(&self.historical)
            .chain(&self.collaborative)
    }

    pub fn element_ids(&self) -> HashSet<String> {
        self.all_elements().map(|e| e.id.clone()).collect()
    }

    pub fn element_count(&self) -> usize {
        self.doctrinal.len()
            + self.situational.len()
            + self.historical.len()
            + self.collaborative.len()
    }

    pub fn total_tokens(&self) -> u32 {
        self.all_elements().map(|e| e.tokens).sum()
    }

    /// Mark an element as referenced. Unknown IDs are rejected so
    /// `referenced` stays a subset of the provisioned IDs.
    pub fn mark_referenced(&mut self, element_id: &str) -> bool {
        if self.all_elements().any(|e| e.id == element_id) {
            self.referenced.insert(element_id.to_string());
            true
        } else {
            false
        }
    }

    /// Verify the window invariants: budget respected, IDs unique across
    /// layers, references a subset of provisioned IDs.
    pub fn check_invariants(&self) -> Result<()> {
        if self.total_tokens() > self.token_budget {
            return Err(AetherError::invariant(format!(
                "context tokens {} exceed budget {}",
                self.total_tokens(),
                self.token_budget
            )));
        }

        let ids = self.element_ids();
        if ids.len() != self.element_count() {
            return Err(AetherError::invariant(
                "duplicate element IDs across context layers",
            ));
        }

        if !self.referenced.is_subset(&ids) {
            return Err(AetherError::invariant(
                "referenced set contains unprovisioned element IDs",
            ));
        }

        Ok(())
    }

    /// Render the window as a prompt fragment, one section per layer, every
    /// element cited by its ID.
    pub fn render(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for (title, elements) in [
            ("DOCTRINE", &self.doctrinal),
            ("SITUATION", &self.situational),
            ("HISTORY", &self.historical),
            ("COLLABORATION", &self.collaborative),
        ] {
            if elements.is_empty() {
                continue;
            }
            let _ = writeln!(out, "## {title}");
            for element in elements {
                let _ = writeln!(out, "[{}] {}", element.id, element.content);
            }
        }
        out
    }
}
