//! Multi-provider LLM dispatch.
//!
//! A priority-ordered provider chain with per-provider retry and exponential
//! backoff, schema-validated structured output (validation failure is a hard
//! error, never silently repaired), and element-ID citation extraction from
//! response text.

pub mod adapter;
pub mod providers;
pub mod structured;
pub mod types;

pub use adapter::{InteractionRecord, LlmAdapter, LlmReply, StructuredReply};
pub use providers::{
    AnthropicConfig, AnthropicProvider, DeterministicProvider, LlmProvider, OllamaConfig,
    OllamaProvider, OpenAiConfig, OpenAiProvider, StreamChunk,
};
pub use structured::{FieldKind, FieldSpec, OutputSchema};
pub use types::{
    CompletionRequest, CompletionResponse, LlmError, Message, MessageRole, ProviderKind, Result,
    TokenUsage,
};
