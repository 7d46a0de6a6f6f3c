//! Coding agent: generation, review, debugging and tests

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{Agent, AgentCore};
use super::profile::{AgentConfig, AgentOverrides};
use super::researcher::bullet_list;
use crate::error::BackendResult;
use crate::transport::InferenceTransport;

pub const CODER_NAME: &str = "Coder";
pub const CODER_MODEL: &str = "qwen2.5:7b";

const DEFAULT_PREAMBLE: &str = "You are an expert programming agent with deep knowledge of many languages and technologies.

Your responsibilities:
- Write clean, efficient, well-documented code
- Review code and suggest improvements
- Explain programming concepts
- Debug and fix problems
- Follow established practices and design patterns

When writing code:
1. Use descriptive names for variables and functions
2. Comment where it helps understanding
3. Follow the conventions of the language
4. Consider edge cases and error handling
5. Favor readability and maintainability

Languages you know well: Python, JavaScript, TypeScript, Go, Rust, Java, C++, and more.";

pub struct CoderAgent {
    core: AgentCore,
}

impl CoderAgent {
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self::with_overrides(transport, AgentOverrides::default())
    }

    pub fn with_overrides(transport: Arc<dyn InferenceTransport>, overrides: AgentOverrides) -> Self {
        let config = overrides.apply(Self::default_config());
        Self {
            core: AgentCore::new(config, transport),
        }
    }

    /// Low temperature keeps generated code close to deterministic
    pub fn default_config() -> AgentConfig {
        AgentConfig::new(CODER_NAME, CODER_MODEL, DEFAULT_PREAMBLE)
            .with_temperature(0.3)
            .with_max_tokens(Some(4096))
            .with_description("Programming and software development agent")
    }

    pub async fn generate_code(
        &self,
        description: &str,
        language: &str,
        requirements: &[String],
    ) -> BackendResult<String> {
        let requirements = if requirements.is_empty() {
            String::new()
        } else {
            format!("\n\nAdditional requirements:\n{}", bullet_list(requirements))
        };
        let task = format!(
            "Write {} code for:\n\n{}{}\n\nProvide:\n\
             1. The complete code\n2. An explanation of how it works\n3. Usage examples where relevant",
            language, description, requirements
        );
        self.run(&task, None).await
    }

    pub async fn review_code(&self, code: &str, language: &str) -> BackendResult<String> {
        let task = format!(
            "Review the following {lang} code:\n\n```{lang}\n{code}\n```\n\nProvide:\n\
             1. Overall quality assessment\n2. Potential problems or bugs\n3. Suggested improvements\n\
             4. Performance considerations\n5. Improved code if needed",
            lang = language,
            code = code
        );
        self.run(&task, None).await
    }

    /// `language: None` leaves the code fence untagged
    pub async fn explain_code(&self, code: &str, language: Option<&str>) -> BackendResult<String> {
        let task = format!(
            "Explain what this code does:\n\n```{}\n{}\n```\n\nProvide:\n\
             1. A high-level summary\n2. A line-by-line walkthrough (for complex code)\n\
             3. Use cases\n4. Possible edge cases",
            language.unwrap_or_default(),
            code
        );
        self.run(&task, None).await
    }

    pub async fn debug_code(&self, code: &str, error: &str, language: &str) -> BackendResult<String> {
        let task = format!(
            "Debug the following {lang} code:\n\nCode:\n```{lang}\n{code}\n```\n\n\
             Error/problem:\n{error}\n\nProvide:\n\
             1. The cause of the error\n2. The fix, explained\n3. Corrected code\n\
             4. How to prevent similar errors",
            lang = language,
            code = code,
            error = error
        );
        self.run(&task, None).await
    }

    pub async fn refactor_code(&self, code: &str, language: &str, goals: &[String]) -> BackendResult<String> {
        let goals = if goals.is_empty() {
            "\n\nGoals: improve readability, efficiency and maintainability".to_string()
        } else {
            format!("\n\nGoals:\n{}", bullet_list(goals))
        };
        let task = format!(
            "Refactor the following {lang} code:\n\n```{lang}\n{code}\n```{goals}\n\nProvide:\n\
             1. The refactored code\n2. An explanation of the changes\n3. The benefits of the refactor",
            lang = language,
            code = code,
            goals = goals
        );
        self.run(&task, None).await
    }

    pub async fn write_tests(
        &self,
        code: &str,
        language: &str,
        framework: Option<&str>,
    ) -> BackendResult<String> {
        let framework = framework
            .map(|f| format!(" using {}", f))
            .unwrap_or_default();
        let task = format!(
            "Write tests{framework} for the following {lang} code:\n\n```{lang}\n{code}\n```\n\nProvide:\n\
             1. Complete unit tests\n2. Cases covering different scenarios\n3. Edge cases\n\
             4. What each case verifies",
            framework = framework,
            lang = language,
            code = code
        );
        self.run(&task, None).await
    }
}

#[async_trait]
impl Agent for CoderAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "Code generation",
            "Code review",
            "Code explanation",
            "Debugging",
            "Refactoring",
            "Test generation",
            "Multiple programming languages",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }
}
