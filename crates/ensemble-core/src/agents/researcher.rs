//! Research agent: deep analysis and step-by-step reasoning

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use super::base::{Agent, AgentCore};
use super::profile::{AgentConfig, AgentOverrides};
use crate::error::BackendResult;
use crate::transport::InferenceTransport;

pub const RESEARCHER_NAME: &str = "Researcher";
pub const RESEARCHER_MODEL: &str = "deepseek-r1:8b";

const DEFAULT_PREAMBLE: &str = "You are an expert research agent with advanced analysis and reasoning skills.

Your responsibilities:
- Analyze complex information and extract the key insights
- Research the given topics thoroughly
- Reason step by step (chain of thought)
- Synthesize information from multiple sources
- Identify patterns, trends and relationships

When researching:
1. Break the problem into manageable parts
2. Analyze each aspect systematically
3. Back your conclusions with evidence
4. Present results clearly and with structure

Be rigorous, objective and thorough.";

/// How much detail `research` asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResearchDepth {
    Shallow,
    #[default]
    Medium,
    Deep,
}

/// Unknown names fall back to `Medium`
impl FromStr for ResearchDepth {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "shallow" => Self::Shallow,
            "deep" => Self::Deep,
            _ => Self::Medium,
        })
    }
}

impl ResearchDepth {

    fn instruction(self) -> &'static str {
        match self {
            Self::Shallow => "Give a brief, concise summary.",
            Self::Medium => "Give a moderately detailed analysis covering the key points.",
            Self::Deep => "Give an exhaustive analysis with step-by-step reasoning.",
        }
    }
}

pub struct ResearcherAgent {
    core: AgentCore,
}

impl ResearcherAgent {
    pub fn new(transport: Arc<dyn InferenceTransport>) -> Self {
        Self::with_overrides(transport, AgentOverrides::default())
    }

    pub fn with_overrides(transport: Arc<dyn InferenceTransport>, overrides: AgentOverrides) -> Self {
        let config = overrides.apply(Self::default_config());
        Self {
            core: AgentCore::new(config, transport),
        }
    }

    pub fn default_config() -> AgentConfig {
        AgentConfig::new(RESEARCHER_NAME, RESEARCHER_MODEL, DEFAULT_PREAMBLE)
            .with_temperature(0.7)
            .with_max_tokens(Some(4096))
            .with_description("Research and in-depth analysis agent")
    }

    pub async fn research(&self, topic: &str, depth: ResearchDepth) -> BackendResult<String> {
        let task = format!(
            "Research the following topic: {}\n\n{}\n\nStructure your answer:\n\
             1. Executive summary\n2. Detailed analysis\n3. Key conclusions\n4. Implications",
            topic,
            depth.instruction()
        );
        self.run(&task, None).await
    }

    pub async fn analyze_document(&self, document: &str, questions: &[String]) -> BackendResult<String> {
        let task = if questions.is_empty() {
            format!(
                "Analyze the following document:\n\n{}\n\nProvide:\n\
                 1. A summary of the content\n2. Main ideas\n3. Key points to remember\n\
                 4. Implications or applications",
                document
            )
        } else {
            format!(
                "Analyze the following document and answer the questions:\n\n\
                 Document:\n{}\n\nQuestions:\n{}\n\n\
                 Give a detailed analysis for each question.",
                document,
                bullet_list(questions)
            )
        };
        self.run(&task, None).await
    }

    pub async fn compare_and_contrast(
        &self,
        first: &str,
        second: &str,
        criteria: &[String],
    ) -> BackendResult<String> {
        let task = if criteria.is_empty() {
            format!(
                "Compare and contrast:\n\nItem 1: {}\nItem 2: {}\n\n\
                 Analyze the similarities, differences, strengths and weaknesses of each.",
                first, second
            )
        } else {
            format!(
                "Compare and contrast:\n\nItem 1: {}\nItem 2: {}\n\n\
                 Comparison criteria:\n{}\n\n\
                 Analyze the similarities and differences and draw conclusions.",
                first,
                second,
                bullet_list(criteria)
            )
        };
        self.run(&task, None).await
    }
}

#[async_trait]
impl Agent for ResearcherAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn capabilities(&self) -> Vec<String> {
        [
            "In-depth research",
            "Document analysis",
            "Chain-of-thought reasoning",
            "Compare and contrast",
            "Information synthesis",
            "Pattern identification",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect()
    }
}

pub(crate) fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}
