//! Agents: shared chat/run behaviour, specialist roles, and the coordinator
//!
//! Every agent wraps an `AgentCore` (config, transport handle, conversation
//! history) and adds role-specific prompt helpers and a capability list.
//! The coordinator owns a registry of other agents and delegates to them.

pub mod base;
pub mod coder;
pub mod coordinator;
pub mod profile;
pub mod registry;
pub mod researcher;

pub use base::{Agent, AgentCore, CustomAgent};
pub use coder::CoderAgent;
pub use coordinator::CoordinatorAgent;
pub use profile::{AgentConfig, AgentOverrides};
pub use registry::AgentRegistry;
pub use researcher::{ResearchDepth, ResearcherAgent};
