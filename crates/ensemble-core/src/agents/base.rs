//! Shared agent execution: single-shot `run` and history-keeping `chat`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::profile::AgentConfig;
use crate::error::BackendResult;
use crate::transport::{ChatRequest, GenerateRequest, InferenceTransport};
use crate::types::{ConversationTurn, TaskContext};

/// Execution state every agent variant owns: its configuration, a transport
/// handle, and its private conversation history.
///
/// History sits behind an async mutex held for the whole of a `chat` call, so
/// concurrent chats on one agent are serialized and turns never interleave.
pub struct AgentCore {
    config: AgentConfig,
    transport: Arc<dyn InferenceTransport>,
    history: Mutex<Vec<ConversationTurn>>,
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("config", &self.config)
            .field("transport", &self.transport.backend_name())
            .finish()
    }
}

impl AgentCore {
    pub fn new(config: AgentConfig, transport: Arc<dyn InferenceTransport>) -> Self {
        info!(
            "Agent initialized: {} using model {}",
            config.name, config.model
        );
        Self {
            config,
            transport,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// One stateless generation. History is left untouched.
    pub async fn run(&self, task: &str, context: Option<&TaskContext>) -> BackendResult<String> {
        info!("Agent {} starting task", self.config.name);

        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prepare_prompt(task, context),
            system: Some(self.config.instruction_preamble.clone()),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        match self.transport.generate(request).await {
            Ok(response) => {
                info!("Agent {} completed task", self.config.name);
                Ok(response)
            }
            Err(e) => {
                error!("Agent {} failed: {}", self.config.name, e);
                Err(e)
            }
        }
    }

    /// One conversational exchange carrying the full history and nothing
    /// else; the preamble only applies to `run`.
    ///
    /// On failure the user turn stays in history without a reply; callers
    /// may retry or `reset_conversation`.
    pub async fn chat(&self, message: &str) -> BackendResult<String> {
        let mut history = self.history.lock().await;
        history.push(ConversationTurn::user(message));

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: history.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(
            "Agent {} chatting with {} turns of history",
            self.config.name,
            history.len()
        );

        let response = match self.transport.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Chat error in {}: {}", self.config.name, e);
                return Err(e);
            }
        };

        let reply = extract_reply(&self.config.name, &response);
        history.push(ConversationTurn::assistant(reply.clone()));
        Ok(reply)
    }

    pub async fn reset_conversation(&self) {
        self.history.lock().await.clear();
        info!("Conversation history reset for {}", self.config.name);
    }

    /// Snapshot copy; mutating it does not touch the agent
    pub async fn conversation_history(&self) -> Vec<ConversationTurn> {
        self.history.lock().await.clone()
    }
}

/// Prompt sent for `run`: the task verbatim, or a context block followed by it
pub fn prepare_prompt(task: &str, context: Option<&TaskContext>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => {
            format!("Context:\n{}\n\nTask:\n{}", ctx.render(), task)
        }
        _ => task.to_string(),
    }
}

/// Pull `message.content` out of a chat response, falling back to the whole
/// document as text when there is no `message` field.
pub fn extract_reply(agent: &str, response: &Value) -> String {
    match response.get("message") {
        Some(message) => message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        None => {
            warn!(
                "Chat response for {} has no message field; using raw response",
                agent
            );
            response.to_string()
        }
    }
}

/// Contract shared by every agent variant.
///
/// Implementors supply their [`AgentCore`] and a capability list; execution is
/// inherited from the core.
#[async_trait]
pub trait Agent: Send + Sync {
    fn core(&self) -> &AgentCore;

    /// Fixed, human-readable labels of what this agent is good for. Purely
    /// descriptive: delegation never checks them.
    fn capabilities(&self) -> Vec<String>;

    fn config(&self) -> &AgentConfig {
        self.core().config()
    }

    fn name(&self) -> &str {
        &self.core().config().name
    }

    async fn run(&self, task: &str, context: Option<&TaskContext>) -> BackendResult<String> {
        self.core().run(task, context).await
    }

    async fn chat(&self, message: &str) -> BackendResult<String> {
        self.core().chat(message).await
    }

    async fn reset_conversation(&self) {
        self.core().reset_conversation().await
    }

    async fn conversation_history(&self) -> Vec<ConversationTurn> {
        self.core().conversation_history().await
    }
}

/// An agent built directly from a configuration and a capability list
#[derive(Debug)]
pub struct CustomAgent {
    core: AgentCore,
    capabilities: Vec<String>,
}

impl CustomAgent {
    /// An empty capability list is replaced by the config description, or
    /// "General assistance" when that is empty too.
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn InferenceTransport>,
        capabilities: Vec<String>,
    ) -> Self {
        let capabilities = if !capabilities.is_empty() {
            capabilities
        } else if !config.description.is_empty() {
            vec![config.description.clone()]
        } else {
            vec!["General assistance".to_string()]
        };
        Self {
            core: AgentCore::new(config, transport),
            capabilities,
        }
    }
}

#[async_trait]
impl Agent for CustomAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }
}
