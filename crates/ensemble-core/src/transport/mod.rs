//! Inference transport abstraction
//!
//! Agents never talk HTTP themselves. They hold an `Arc<dyn InferenceTransport>`
//! and issue single-shot `generate` or stateful `chat` requests through it.
//! [`OllamaClient`] is the production implementation.

pub mod ollama;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackendResult;
use crate::types::ConversationTurn;

pub use ollama::{LocalModel, OllamaClient};

/// Single-shot completion request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// System-level directive (the agent's instruction preamble)
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Multi-turn chat request carrying a full conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ConversationTurn>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Trait every inference backend implements
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    /// Human-readable backend name (e.g. "ollama")
    fn backend_name(&self) -> &str;

    /// Non-streaming completion. A successful empty reply is `Ok("")`.
    async fn generate(&self, request: GenerateRequest) -> BackendResult<String>;

    /// Chat completion. Returns the raw response document; extracting the
    /// reply text is the caller's job.
    async fn chat(&self, request: ChatRequest) -> BackendResult<Value>;
}
