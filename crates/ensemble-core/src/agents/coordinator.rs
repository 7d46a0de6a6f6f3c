//! Coordinator agent: planning, delegation and synthesis

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::base::{Agent, AgentCore};
use super::profile::{AgentConfig, AgentOverrides};
use super::registry::AgentRegistry;
use crate::error::BackendResult;
use crate::orchestrator::{
    self, DelegationMap, DelegationOptions, DelegationResult, format_capabilities, format_results,
};
use crate::plan::TaskPlan;
use crate::transport::InferenceTransport;

pub const COORDINATOR_NAME: &str = "Coordinator";
pub const COORDINATOR_MODEL: &str = "llama3.2";

const DEFAULT_PREAMBLE: &str = "You are a coordinating agent that manages a team of specialized agents.

Your responsibilities:
- Analyze complex tasks and split them into subtasks
- Assign each subtask to the most suitable agent
- Integrate results from several agents
- Ensure the overall quality and coherence of the final result

When coordinating:
1. Identify which kinds of expertise the task needs
2. Plan the execution order
3. Hand out work according to each agent's strengths
4. Combine the results into one coherent answer

Be efficient, organized and strategic.";

/// Owns a registry of specialist agents and drives them
pub struct CoordinatorAgent {
    core: AgentCore,
    registry: AgentRegistry,
    options: DelegationOptions,
}

impl CoordinatorAgent {
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self::with_overrides(transport, AgentOverrides::default())
    }

    pub fn with_overrides(transport: Arc<dyn InferenceTransport>, overrides: AgentOverrides) -> Self {
        let config = overrides.apply(Self::default_config());
        Self {
            core: AgentCore::new(config, transport),
            registry: AgentRegistry::new(),
            options: DelegationOptions::default(),
        }
    }

    pub fn with_delegation_options(mut self, options: DelegationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn default_config() -> AgentConfig {
        AgentConfig::new(COORDINATOR_NAME, COORDINATOR_MODEL, DEFAULT_PREAMBLE)
            .with_temperature(0.5)
            .with_max_tokens(Some(3072))
            .with_description("Coordinating agent that manages multiple specialized agents")
    }

    pub fn delegation_options(&self) -> &DelegationOptions {
        &self.options
    }

    /// Make `agent` available for delegation. A second agent with the same
    /// name replaces the first.
    pub fn register_agent(&mut self, agent: Arc<dyn Agent>) {
        self.registry.register(agent);
    }

    pub fn list_available_agents(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Ask the model for a plan. The reply is returned as-is; use
    /// [`TaskPlan::subtasks`] to pull structure out of it.
    pub async fn plan_task(&self, task: &str) -> BackendResult<TaskPlan> {
        info!("Planning task with {} agents available", self.registry.count());
        let prompt = planning_prompt(task, &format_capabilities(&self.registry.capabilities()));
        let plan = self.run(&prompt, None).await?;
        Ok(TaskPlan {
            plan,
            task: task.to_string(),
        })
    }

    /// Run every assignment without synthesizing
    pub async fn delegate(&self, assignments: &DelegationMap) -> BackendResult<DelegationResult> {
        orchestrator::delegate(&self.registry, assignments, &self.options).await
    }

    pub async fn synthesize(&self, task: &str, results: &DelegationResult) -> BackendResult<String> {
        let prompt = synthesis_prompt(task, &format_results(results));
        self.run(&prompt, None).await
    }

    /// Delegate each subtask to its agent, then merge the outputs with one
    /// final model call. Any backend failure aborts before synthesis.
    pub async fn delegate_and_synthesize(
        &self,
        task: &str,
        assignments: &DelegationMap,
    ) -> BackendResult<String> {
        let results = self.delegate(assignments).await?;
        self.synthesize(task, &results).await
    }
}

#[async_trait]
impl Agent for CoordinatorAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Task planning",
            "Work delegation",
            "Result synthesis",
            "Multi-agent coordination",
            "Problem decomposition",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }
}

fn planning_prompt(task: &str, capabilities: &str) -> String {
    format!(
        "Analyze the following complex task and create an execution plan:\n\n\
         Task: {task}\n\n\
         Available agents and their capabilities:\n{capabilities}\n\n\
         Produce a structured plan that includes:\n\
         1. A breakdown of the task into subtasks\n\
         2. The recommended agent for each subtask\n\
         3. The execution order\n\
         4. How to integrate the results\n\n\
         Response format:\n\
         SUBTASK 1: [description]\n\
         AGENT: [agent name]\n\
         REASON: [why this agent]\n\n\
         SUBTASK 2: ...",
        task = task,
        capabilities = capabilities
    )
}

fn synthesis_prompt(task: &str, results: &str) -> String {
    format!(
        "Synthesize the following results from different agents:\n\n\
         Original task: {}\n\n\
         Results by agent:\n{}\n\n\
         Produce a coherent, complete final result that integrates all of the information.",
        task, results
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{CoderAgent, ResearcherAgent};
    use crate::error::BackendError;
    use crate::transport::testing::ScriptedTransport;

    fn coordinator(transport: &Arc<ScriptedTransport>) -> CoordinatorAgent {
        let mut coordinator = CoordinatorAgent::new(transport.clone());
        coordinator.register_agent(Arc::new(ResearcherAgent::new(transport.clone())));
        coordinator.register_agent(Arc::new(CoderAgent::new(transport.clone())));
        coordinator
    }

    #[test]
    fn test_defaults() {
        let agent = CoordinatorAgent::new(Arc::new(ScriptedTransport::new()));
        assert_eq!(agent.name(), "Coordinator");
        assert_eq!(agent.config().model, "llama3.2");
        assert_eq!(agent.config().temperature, 0.5);
        assert_eq!(agent.config().max_tokens, Some(3072));
        assert_eq!(agent.capabilities().len(), 5);
        assert!(agent.list_available_agents().is_empty());
    }

    #[test]
    fn test_register_lists_in_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = coordinator(&transport);
        assert_eq!(agent.list_available_agents(), vec!["Researcher", "Coder"]);
    }

    #[tokio::test]
    async fn test_plan_task_prompt_lists_capabilities() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = coordinator(&transport);

        let plan = agent.plan_task("Build a web scraper").await.unwrap();
        assert_eq!(plan.task, "Build a web scraper");
        assert_eq!(plan.plan, "reply 1");

        let prompt = &transport.generate_prompts()[0];
        assert!(prompt.contains("Task: Build a web scraper"));
        assert!(prompt.contains("- Researcher: In-depth research, Document analysis"));
        assert!(prompt.contains("- Coder: Code generation"));
        assert!(prompt.contains("SUBTASK 1: [description]"));
        assert!(agent.conversation_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_plan_task_with_no_agents() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = CoordinatorAgent::new(transport.clone());
        agent.plan_task("anything").await.unwrap();
        assert!(
            transport.generate_prompts()[0]
                .contains("Available agents and their capabilities:\n\n")
        );
    }

    #[tokio::test]
    async fn test_delegate_and_synthesize() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = coordinator(&transport);
        let assignments = DelegationMap::new()
            .assign("Researcher", vec!["look into X"])
            .assign("Coder", vec!["implement X"]);

        let out = agent
            .delegate_and_synthesize("Ship X", &assignments)
            .await
            .unwrap();
        assert_eq!(out, "reply 3");
        assert_eq!(transport.call_count(), 3);

        let prompts = transport.generate_prompts();
        assert_eq!(prompts[0], "look into X");
        assert_eq!(prompts[1], "implement X");
        let synthesis = &prompts[2];
        assert!(synthesis.contains("Original task: Ship X"));
        assert!(synthesis.contains("=== RESEARCHER ===\n\nSubtask 1:\nreply 1"));
        assert!(synthesis.contains("=== CODER ===\n\nSubtask 1:\nreply 2"));
    }

    #[tokio::test]
    async fn test_unknown_agents_only_still_synthesizes() {
        let transport = Arc::new(ScriptedTransport::new());
        let agent = coordinator(&transport);
        let assignments = DelegationMap::new().assign("Nobody", vec!["t"]);

        agent
            .delegate_and_synthesize("task", &assignments)
            .await
            .unwrap();
        assert_eq!(transport.call_count(), 1);
        assert!(transport.generate_prompts()[0].contains("Results by agent:\n\n\n"));
    }

    #[tokio::test]
    async fn test_failure_skips_synthesis() {
        let transport = Arc::new(ScriptedTransport::failing_on(1));
        let agent = coordinator(&transport);
        let assignments = DelegationMap::new()
            .assign("Researcher", vec!["a"])
            .assign("Coder", vec!["b"]);

        let err = agent
            .delegate_and_synthesize("task", &assignments)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
        assert_eq!(transport.call_count(), 1);
    }
}
