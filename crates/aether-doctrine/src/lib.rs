//! Doctrine knowledge base facade.
//!
//! Wraps an external vector index behind the narrow interface the rest of
//! AetherOS consumes: semantic query, named-procedure lookup, and compliance
//! verdicts for the authorization engine's doctrinal-fit factor. The index
//! itself (embedding model, persistence) lives outside the core; tests and
//! demos use the in-memory keyword-scored index.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use aether_types::{AetherError, Result};

/// A scored doctrine passage returned from the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctrinePassage {
    pub id: String,
    pub content: String,
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Relevance in [0, 1], higher is closer.
    pub score: f32,
}

/// Compliance status for a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    /// No doctrine spoke to the action either way.
    Unknown,
}

/// Verdict from a doctrinal compliance check, with the passages that
/// informed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub status: ComplianceStatus,
    pub rationale: String,
    pub citations: Vec<String>,
}

/// Interface to the backing vector index. Implemented in-process for tests;
/// production wires an adapter over the real index.
#[async_trait]
pub trait DoctrineIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filters: Option<&serde_json::Value>,
        top_k: usize,
    ) -> Result<Vec<DoctrinePassage>>;

    async fn fetch_procedure(&self, name: &str) -> Result<Option<DoctrinePassage>>;

    async fn count(&self) -> Result<usize>;
}

/// Semantic-search facade over a [`DoctrineIndex`].
pub struct DoctrineKb {
    index: Arc<dyn DoctrineIndex>,
}

impl DoctrineKb {
    pub fn new(index: Arc<dyn DoctrineIndex>) -> Self {
        Self { index }
    }

    /// Query doctrine passages relevant to `text`.
    pub async fn query(
        &self,
        text: &str,
        filters: Option<&serde_json::Value>,
        top_k: usize,
    ) -> Result<Vec<DoctrinePassage>> {
        let results = self.index.search(text, filters, top_k).await?;
        tracing::debug!(query = text, results = results.len(), "doctrine query");
        Ok(results)
    }

    /// Look up a named procedure.
    pub async fn get_procedure(&self, name: &str) -> Result<Option<DoctrinePassage>> {
        self.index.fetch_procedure(name).await
    }

    /// Judge whether an action description complies with doctrine.
    ///
    /// Passages tagged `constraint: "prohibit"` that match the action produce
    /// a non-compliant verdict; matching passages without a prohibition are
    /// treated as compliant; no matches at all is `Unknown`.
    pub async fn check_compliance(&self, action_description: &str) -> Result<ComplianceVerdict> {
        let passages = self.index.search(action_description, None, 5).await?;

        if passages.is_empty() {
            return Ok(ComplianceVerdict {
                status: ComplianceStatus::Unknown,
                rationale: "no doctrine passages matched the action".to_string(),
                citations: vec![],
            });
        }

        let citations: Vec<String> = passages.iter().map(|p| p.id.clone()).collect();
        let prohibition = passages.iter().find(|p| {
            p.metadata
                .get("constraint")
                .and_then(|c| c.as_str())
                .map(|c| c == "prohibit")
                .unwrap_or(false)
        });

        let verdict = match prohibition {
            Some(p) => ComplianceVerdict {
                status: ComplianceStatus::NonCompliant,
                rationale: format!("prohibited by {}", p.source),
                citations,
            },
            None => ComplianceVerdict {
                status: ComplianceStatus::Compliant,
                rationale: format!("{} supporting passages, no prohibitions", passages.len()),
                citations,
            },
        };

        tracing::debug!(
            action = action_description,
            status = ?verdict.status,
            "compliance check"
        );
        Ok(verdict)
    }

    pub async fn count_documents(&self) -> Result<usize> {
        self.index.count().await
    }
}

/// In-memory index scored by keyword overlap. Stands in for the external
/// vector index in tests and demos.
#[derive(Default)]
pub struct MemoryDoctrineIndex {
    passages: RwLock<Vec<DoctrinePassage>>,
}

impl MemoryDoctrineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, passage: DoctrinePassage) {
        self.passages.write().await.push(passage);
    }

    pub async fn insert_all(&self, passages: Vec<DoctrinePassage>) {
        self.passages.write().await.extend(passages);
    }

    fn overlap_score(query: &str, content: &str) -> f32 {
        let query_terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if query_terms.is_empty() {
            return 0.0;
        }
        let haystack = content.to_lowercase();
        let hits = query_terms.iter().filter(|t| haystack.contains(*t)).count();
        hits as f32 / query_terms.len() as f32
    }

    fn matches_filters(passage: &DoctrinePassage, filters: Option<&serde_json::Value>) -> bool {
        let Some(serde_json::Value::Object(wanted)) = filters else {
            return true;
        };
        wanted
            .iter()
            .all(|(key, value)| passage.metadata.get(key) == Some(value))
    }
}

#[async_trait]
impl DoctrineIndex for MemoryDoctrineIndex {
    async fn search(
        &self,
        query: &str,
        filters: Option<&serde_json::Value>,
        top_k: usize,
    ) -> Result<Vec<DoctrinePassage>> {
        let passages = self.passages.read().await;
        let mut scored: Vec<DoctrinePassage> = passages
            .iter()
            .filter(|p| Self::matches_filters(p, filters))
            .map(|p| {
                let mut p = p.clone();
                p.score = Self::overlap_score(query, &p.content);
                p
            })
            .filter(|p| p.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn fetch_procedure(&self, name: &str) -> Result<Option<DoctrinePassage>> {
        let passages = self.passages.read().await;
        Ok(passages
            .iter()
            .find(|p| {
                p.metadata
                    .get("procedure")
                    .and_then(|n| n.as_str())
                    .map(|n| n == name)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.passages.read().await.len())
    }
}

/// An index adapter whose backing store is down. Used to exercise the
/// soft-fail path of the doctrinal-fit factor.
pub struct UnavailableIndex;

#[async_trait]
impl DoctrineIndex for UnavailableIndex {
    async fn search(
        &self,
        _query: &str,
        _filters: Option<&serde_json::Value>,
        _top_k: usize,
    ) -> Result<Vec<DoctrinePassage>> {
        Err(AetherError::unavailable("doctrine"))
    }

    async fn fetch_procedure(&self, _name: &str) -> Result<Option<DoctrinePassage>> {
        Err(AetherError::unavailable("doctrine"))
    }

    async fn count(&self) -> Result<usize> {
        Err(AetherError::unavailable("doctrine"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passage(id: &str, content: &str, metadata: serde_json::Value) -> DoctrinePassage {
        DoctrinePassage {
            id: id.to_string(),
            content: content.to_string(),
            source: format!("AFDP-{id}"),
            metadata,
            score: 0.0,
        }
    }

    #[tokio::test]
    async fn query_ranks_by_overlap() {
        let index = MemoryDoctrineIndex::new();
        index
            .insert(passage(
                "p1",
                "spectrum deconfliction procedures for frequency allocation",
                json!({}),
            ))
            .await;
        index
            .insert(passage("p2", "assessment reporting formats", json!({})))
            .await;

        let kb = DoctrineKb::new(Arc::new(index));
        let results = kb.query("frequency allocation procedures", None, 5).await.unwrap();
        assert_eq!(results[0].id, "p1");
        assert!(results[0].score > 0.5);
    }

    #[tokio::test]
    async fn compliance_flags_prohibitions() {
        let index = MemoryDoctrineIndex::new();
        index
            .insert(passage(
                "p3",
                "jamming in civil aviation bands is prohibited",
                json!({"constraint": "prohibit"}),
            ))
            .await;

        let kb = DoctrineKb::new(Arc::new(index));
        let verdict = kb
            .check_compliance("jamming civil aviation bands")
            .await
            .unwrap();
        assert_eq!(verdict.status, ComplianceStatus::NonCompliant);
        assert_eq!(verdict.citations, vec!["p3".to_string()]);
    }

    #[tokio::test]
    async fn compliance_unknown_without_matches() {
        let kb = DoctrineKb::new(Arc::new(MemoryDoctrineIndex::new()));
        let verdict = kb.check_compliance("reposition tanker tracks").await.unwrap();
        assert_eq!(verdict.status, ComplianceStatus::Unknown);
    }

    #[tokio::test]
    async fn procedure_lookup_by_name() {
        let index = MemoryDoctrineIndex::new();
        index
            .insert(passage(
                "p4",
                "JCEOI development steps",
                json!({"procedure": "jceoi_development"}),
            ))
            .await;
        let kb = DoctrineKb::new(Arc::new(index));
        let found = kb.get_procedure("jceoi_development").await.unwrap();
        assert_eq!(found.unwrap().id, "p4");
        assert!(kb.get_procedure("missing").await.unwrap().is_none());
    }
}
