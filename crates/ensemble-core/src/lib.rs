//! ensemble-core - multi-agent orchestration over a local LLM backend
//!
//! This crate provides:
//! - Agents with per-agent conversation history and single-shot task runs
//! - Researcher, Coder and Coordinator roles plus free-form custom agents
//! - A capability registry and sequential or bounded-concurrent delegation
//! - An Ollama HTTP transport, including streamed generation
//! - A static model catalog with availability checks
//! - A lenient parser for coordinator plans

pub mod agents;
pub mod catalog;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use agents::{
    Agent, AgentConfig, AgentCore, AgentOverrides, AgentRegistry, CoderAgent, CoordinatorAgent,
    CustomAgent, ResearchDepth, ResearcherAgent,
};
pub use catalog::{ModelInfo, ModelManager, ModelStore, ModelTier, recommended_for};
pub use error::{BackendError, BackendResult};
pub use orchestrator::{DelegationMap, DelegationMode, DelegationOptions, DelegationResult};
pub use plan::{PlannedSubtask, TaskPlan, parse_plan};
pub use transport::{ChatRequest, GenerateRequest, InferenceTransport, LocalModel, OllamaClient};
pub use types::{ConversationTurn, Role, TaskContext};
