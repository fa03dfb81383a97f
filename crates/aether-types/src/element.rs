//! Context elements - the citation unit of provisioned context.

use serde::{Deserialize, Serialize};

/// The kind of a context element, which also determines its ID prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Doctrine,
    Threat,
    Mission,
    Historical,
    Collaborative,
}

impl ElementKind {
    pub const ALL: [ElementKind; 5] = [
        Self::Doctrine,
        Self::Threat,
        Self::Mission,
        Self::Historical,
        Self::Collaborative,
    ];

    /// The typed ID prefix for this kind (`DOC-`, `THR-`, ...).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Doctrine => "DOC",
            Self::Threat => "THR",
            Self::Mission => "MSN",
            Self::Historical => "HIST",
            Self::Collaborative => "COLL",
        }
    }
}

/// One provisioned context element. Elements carry a globally unique,
/// prefix-typed ID so agent responses can cite them verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextElement {
    pub id: String,
    pub kind: ElementKind,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub relevance_score: f32,
    /// Estimated token footprint of `content`.
    pub tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ContextElement {
    pub fn new(
        id: impl Into<String>,
        kind: ElementKind,
        content: impl Into<String>,
        relevance_score: f32,
    ) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        Self {
            id: id.into(),
            kind,
            content,
            metadata: serde_json::Value::Null,
            relevance_score,
            tokens,
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Rough token estimate at ~4 characters per token, never zero for
/// non-empty content.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        0
    } else {
        ((text.len() + 3) / 4) as u32
    }
}
