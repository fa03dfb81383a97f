//! The provider chain adapter.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::{
    AnthropicProvider, DeterministicProvider, LlmProvider, OllamaProvider, OpenAiProvider,
};
use crate::structured::OutputSchema;
use crate::types::*;

/// Final result of a dispatched completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmReply {
    pub content: String,
    pub usage: TokenUsage,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub finish_reason: String,
}

/// A schema-validated structured reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredReply {
    pub value: Value,
    /// Element-ID citations extracted from every string field.
    pub citations: Vec<String>,
    pub reply: LlmReply,
}

/// One logged LLM interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub agent_id: String,
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub total_tokens: u32,
    pub success: bool,
}

/// Dispatches completions across a priority-ordered provider chain.
///
/// Each provider is retried up to `max_retries` times with exponential
/// backoff on transport failures and rate limits before the chain falls
/// through to the next provider.
pub struct LlmAdapter {
    chain: Vec<Arc<dyn LlmProvider>>,
    max_retries: u32,
    base_backoff: Duration,
    citation_pattern: Regex,
    interactions: RwLock<Vec<InteractionRecord>>,
}

impl LlmAdapter {
    pub fn new(chain: Vec<Arc<dyn LlmProvider>>) -> Self {
        Self {
            chain,
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
            citation_pattern: Regex::new(r"\b(?:DOC|THR|MSN|HIST|COLL)-[A-Za-z0-9_]+\b")
                .expect("citation pattern is valid"),
            interactions: RwLock::new(Vec::new()),
        }
    }

    /// Build the chain from the environment: `AETHER_LLM_PROVIDERS` is a
    /// comma-separated priority list; unavailable providers are skipped and
    /// the deterministic fallback always terminates the chain.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let order = std::env::var("AETHER_LLM_PROVIDERS")
            .unwrap_or_else(|_| "anthropic,openai,ollama".to_string());

        let mut chain: Vec<Arc<dyn LlmProvider>> = Vec::new();
        for name in order.split(',') {
            match ProviderKind::parse(name.trim()) {
                Some(ProviderKind::Anthropic) => {
                    if let Some(p) = AnthropicProvider::from_env() {
                        chain.push(Arc::new(p));
                    } else {
                        tracing::warn!("Anthropic API key not found, skipping provider");
                    }
                }
                Some(ProviderKind::OpenAi) => {
                    if let Some(p) = OpenAiProvider::from_env() {
                        chain.push(Arc::new(p));
                    } else {
                        tracing::warn!("OpenAI API key not found, skipping provider");
                    }
                }
                Some(ProviderKind::Ollama) => chain.push(Arc::new(OllamaProvider::from_env())),
                Some(ProviderKind::Deterministic) | None => {}
            }
        }
        chain.push(Arc::new(DeterministicProvider::new()));
        Self::new(chain)
    }

    pub fn with_retries(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        self.chain.iter().map(|p| p.kind()).collect()
    }

    /// Dispatch a completion through the chain.
    pub async fn complete(&self, request: CompletionRequest) -> Result<LlmReply> {
        self.complete_for("system", request).await
    }

    /// Dispatch on behalf of an agent, logging the interaction.
    pub async fn complete_for(
        &self,
        agent_id: &str,
        request: CompletionRequest,
    ) -> Result<LlmReply> {
        let mut last_error: Option<LlmError> = None;

        for provider in &self.chain {
            if !provider.is_available().await {
                tracing::debug!(provider = provider.name(), "provider unavailable, skipping");
                continue;
            }

            for attempt in 0..=self.max_retries {
                match provider.complete(request.clone()).await {
                    Ok(response) => {
                        let reply = LlmReply {
                            content: response.content,
                            usage: response.usage,
                            provider: provider.kind(),
                            model: response.model,
                            finish_reason: response.finish_reason,
                        };
                        self.log_interaction(agent_id, &reply, true);
                        return Ok(reply);
                    }
                    Err(error) => {
                        tracing::warn!(
                            provider = provider.name(),
                            attempt,
                            %error,
                            "completion attempt failed"
                        );
                        let retryable = error.is_retryable();
                        last_error = Some(error);
                        if !retryable || attempt == self.max_retries {
                            break;
                        }
                        tokio::time::sleep(self.base_backoff * 2u32.pow(attempt)).await;
                    }
                }
            }
        }

        self.interactions.write().unwrap().push(InteractionRecord {
            interaction_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            provider: ProviderKind::Deterministic,
            model: None,
            total_tokens: 0,
            success: false,
        });
        Err(LlmError::Exhausted {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no providers configured".to_string()),
        })
    }

    /// Dispatch with schema validation. The response must parse as JSON and
    /// satisfy `schema`; anything else is a hard [`LlmError::SchemaViolation`].
    pub async fn complete_structured(
        &self,
        agent_id: &str,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> Result<StructuredReply> {
        let request = CompletionRequest::new(vec![Message::user(user_prompt)])
            .with_system(system_prompt)
            .with_json_mode();

        let reply = self.complete_for(agent_id, request).await?;

        let value: Value =
            serde_json::from_str(&reply.content).map_err(|e| LlmError::SchemaViolation {
                message: format!("response is not valid JSON: {e}"),
            })?;

        schema.validate(&value)?;

        let citations = self.extract_citations(&value);
        Ok(StructuredReply {
            value,
            citations,
            reply,
        })
    }

    /// Walk every string field of the value and collect element-ID tokens
    /// matching the prefix grammar, even when the schema has no explicit
    /// citations field.
    pub fn extract_citations(&self, value: &Value) -> Vec<String> {
        let mut citations = Vec::new();
        let mut seen = std::collections::HashSet::new();
        self.walk_strings(value, &mut |text| {
            for m in self.citation_pattern.find_iter(text) {
                let id = m.as_str().to_string();
                if seen.insert(id.clone()) {
                    citations.push(id);
                }
            }
        });
        citations
    }

    fn walk_strings(&self, value: &Value, visit: &mut dyn FnMut(&str)) {
        match value {
            Value::String(s) => visit(s),
            Value::Array(items) => {
                for item in items {
                    self.walk_strings(item, visit);
                }
            }
            Value::Object(map) => {
                for item in map.values() {
                    self.walk_strings(item, visit);
                }
            }
            _ => {}
        }
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.interactions.read().unwrap().clone()
    }

    fn log_interaction(&self, agent_id: &str, reply: &LlmReply, success: bool) {
        self.interactions.write().unwrap().push(InteractionRecord {
            interaction_id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            provider: reply.provider,
            model: reply.model.clone(),
            total_tokens: reply.usage.total_tokens,
            success,
        });
    }
}
