//! LLM provider implementations.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::types::*;

/// A chunk from a streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub is_final: bool,
}

/// Trait for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> ProviderKind;

    async fn is_available(&self) -> bool;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stream a completion. The default implementation degrades to a single
    /// final chunk from the non-streaming path.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let response = self.complete(request).await?;
        let chunk = StreamChunk {
            delta: response.content,
            is_final: true,
        };
        Ok(Box::pin(futures::stream::once(async { Ok(chunk) })))
    }
}

// ============================================================================
// Anthropic
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
}

impl AnthropicConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").ok()?,
            model: std::env::var("AETHER_ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
        })
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        Some(Self::new(AnthropicConfig::from_env()?))
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "Anthropic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let messages = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                    MessageRole::System => unreachable!(),
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect();

        let system = if request.json_mode {
            Some(
                request.system.clone().unwrap_or_default()
                    + "\n\nIMPORTANT: Respond with valid JSON only.",
            )
        } else {
            request.system.clone()
        };

        let wire = AnthropicRequest {
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            max_tokens: request.max_tokens.unwrap_or(4096),
            system,
            messages,
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&wire)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        if response.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: AnthropicResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            })?;

        Ok(CompletionResponse {
            content: parsed
                .content
                .first()
                .map(|c| c.text.clone())
                .unwrap_or_default(),
            usage: TokenUsage {
                prompt_tokens: parsed.usage.input_tokens,
                completion_tokens: parsed.usage.output_tokens,
                total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            },
            model: Some(self.config.model.clone()),
            finish_reason: parsed.stop_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }
}

// ============================================================================
// OpenAI
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl OpenAiConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: std::env::var("OPENAI_API_KEY").ok()?,
            model: std::env::var("AETHER_OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("AETHER_OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        })
    }
}

pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Option<Self> {
        Some(Self::new(OpenAiConfig::from_env()?))
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn is_available(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(WireMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for m in &request.messages {
            messages.push(WireMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            });
        }

        let wire = OpenAiChatRequest {
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request
                .json_mode
                .then(|| serde_json::json!({"type": "json_object"})),
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        if response.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let parsed: OpenAiChatResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            })?;

        let usage = parsed.usage.unwrap_or_default();
        let (content, finish_reason) = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| {
                (
                    c.message.content,
                    c.finish_reason.unwrap_or_else(|| "stop".to_string()),
                )
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            model: Some(self.config.model.clone()),
            finish_reason,
        })
    }
}

// ============================================================================
// Ollama (local)
// ============================================================================

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("AETHER_OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("AETHER_OLLAMA_MODEL")
                .unwrap_or_else(|_| "llama3.1:8b".to_string()),
        }
    }
}

pub struct OllamaProvider {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(OllamaConfig::default())
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "Ollama"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        self.client.get(&url).send().await.is_ok()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let prompt = request
            .messages
            .iter()
            .map(|m| match m.role {
                MessageRole::User => format!("User: {}", m.content),
                MessageRole::Assistant => format!("Assistant: {}", m.content),
                MessageRole::System => format!("System: {}", m.content),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
            + "\n\nAssistant:";

        let system = if request.json_mode {
            Some(
                request.system.clone().unwrap_or_default()
                    + "\n\nIMPORTANT: You must respond with valid JSON only. No other text.",
            )
        } else {
            request.system.clone()
        };

        let wire = OllamaRequest {
            model: request.model.unwrap_or_else(|| self.config.model.clone()),
            prompt,
            stream: false,
            system,
        };

        let url = format!("{}/api/generate", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&wire)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LlmError::RequestFailed {
                message: format!("HTTP {}", response.status()),
            });
        }

        let parsed: OllamaResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            })?;

        Ok(CompletionResponse {
            content: parsed.response.trim().to_string(),
            usage: TokenUsage::default(),
            model: Some(self.config.model.clone()),
            finish_reason: "stop".to_string(),
        })
    }
}

// ============================================================================
// Deterministic fallback
// ============================================================================

/// Terminal fallback when no LLM is reachable. Always available; returns a
/// fixed structured response.
#[derive(Default)]
pub struct DeterministicProvider;

impl DeterministicProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmProvider for DeterministicProvider {
    fn name(&self) -> &'static str {
        "Deterministic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Deterministic
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            content: r#"{"note": "no LLM available, deterministic fallback"}"#.to_string(),
            usage: TokenUsage::default(),
            model: Some("deterministic".to_string()),
            finish_reason: "stop".to_string(),
        })
    }
}
