//! Delegation engine
//!
//! Runs ordered subtask lists against registered agents and renders the
//! collected outputs for synthesis. Unknown agent names are skipped with a
//! warning; the first backend failure aborts the whole delegation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agents::{Agent, AgentRegistry};
use crate::error::{BackendError, BackendResult};

/// How different agents' subtask lists are scheduled.
///
/// Within one agent, subtasks always run one after another in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationMode {
    #[default]
    Sequential,
    Concurrent,
}

impl std::fmt::Display for DelegationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationOptions {
    #[serde(default)]
    pub mode: DelegationMode,
    /// Only used in concurrent mode
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
}

fn default_max_concurrent_agents() -> usize {
    4
}

impl Default for DelegationOptions {
    fn default() -> Self {
        Self {
            mode: DelegationMode::Sequential,
            max_concurrent_agents: default_max_concurrent_agents(),
        }
    }
}

/// Agent name → ordered subtasks, iterated in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationMap {
    entries: Vec<(String, Vec<String>)>,
}

impl DelegationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the subtasks for `agent`, replacing any earlier list in place
    pub fn assign<S: Into<String>>(mut self, agent: impl Into<String>, subtasks: Vec<S>) -> Self {
        let agent = agent.into();
        let subtasks: Vec<String> = subtasks.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|(name, _)| *name == agent) {
            Some(entry) => entry.1 = subtasks,
            None => self.entries.push((agent, subtasks)),
        }
        self
    }

    /// Append one subtask to `agent`'s list
    pub fn push(&mut self, agent: impl Into<String>, subtask: impl Into<String>) {
        let agent = agent.into();
        let subtask = subtask.into();
        match self.entries.iter_mut().find(|(name, _)| *name == agent) {
            Some(entry) => entry.1.push(subtask),
            None => self.entries.push((agent, vec![subtask])),
        }
    }

    pub fn get(&self, agent: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == agent)
            .map(|(_, tasks)| tasks.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, tasks)| (name.as_str(), tasks.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subtask_count(&self) -> usize {
        self.entries.iter().map(|(_, tasks)| tasks.len()).sum()
    }
}

impl<A: Into<String>, S: Into<String>> FromIterator<(A, Vec<S>)> for DelegationMap {
    fn from_iter<I: IntoIterator<Item = (A, Vec<S>)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |map, (agent, tasks)| map.assign(agent, tasks))
    }
}

/// Outputs collected by one delegation, one per subtask in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegationResult {
    entries: Vec<(String, Vec<String>)>,
    skipped: Vec<String>,
}

impl DelegationResult {
    pub fn get(&self, agent: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == agent)
            .map(|(_, outputs)| outputs.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, outputs)| (name.as_str(), outputs.as_slice()))
    }

    /// Names that were not registered and therefore never ran
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Execute `assignments` against `registry`
pub async fn delegate(
    registry: &AgentRegistry,
    assignments: &DelegationMap,
    options: &DelegationOptions,
) -> BackendResult<DelegationResult> {
    info!(
        "Delegating {} subtasks across {} agents ({})",
        assignments.subtask_count(),
        assignments.len(),
        options.mode
    );
    match options.mode {
        DelegationMode::Sequential => delegate_sequential(registry, assignments).await,
        DelegationMode::Concurrent => {
            delegate_concurrent(registry, assignments, options.max_concurrent_agents).await
        }
    }
}

async fn delegate_sequential(
    registry: &AgentRegistry,
    assignments: &DelegationMap,
) -> BackendResult<DelegationResult> {
    let mut result = DelegationResult::default();
    for (agent_name, subtasks) in assignments.iter() {
        let Some(agent) = registry.get(agent_name) else {
            warn!("Agent {} not available, skipping", agent_name);
            result.skipped.push(agent_name.to_string());
            continue;
        };
        let outputs = run_subtasks(agent.as_ref(), subtasks).await?;
        result.entries.push((agent_name.to_string(), outputs));
    }
    Ok(result)
}

async fn delegate_concurrent(
    registry: &AgentRegistry,
    assignments: &DelegationMap,
    max_concurrent: usize,
) -> BackendResult<DelegationResult> {
    let mut result = DelegationResult::default();
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    // Dropping the set aborts every task still in it
    let mut tasks = JoinSet::new();
    let mut names = Vec::new();

    for (agent_name, subtasks) in assignments.iter() {
        let Some(agent) = registry.get(agent_name) else {
            warn!("Agent {} not available, skipping", agent_name);
            result.skipped.push(agent_name.to_string());
            continue;
        };
        let slot = names.len();
        names.push(agent_name.to_string());
        let agent = Arc::clone(agent);
        let subtasks = subtasks.to_vec();
        let sem = semaphore.clone();
        tasks.spawn(async move {
            let outcome = match sem.acquire_owned().await {
                Ok(_permit) => run_subtasks(agent.as_ref(), &subtasks).await,
                Err(_) => Err(BackendError::Unavailable(
                    "delegation semaphore closed".to_string(),
                )),
            };
            (slot, outcome)
        });
    }

    let mut outputs: Vec<Option<Vec<String>>> = vec![None; names.len()];
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((slot, Ok(done))) => {
                outputs[slot] = Some(done);
                continue;
            }
            Ok((slot, Err(e))) => {
                warn!("Agent {} failed, aborting delegation: {}", names[slot], e);
                e
            }
            Err(e) => BackendError::Unavailable(format!("delegation task failed: {}", e)),
        };
        tasks.abort_all();
        return Err(failure);
    }

    result.entries = names
        .into_iter()
        .zip(outputs)
        .filter_map(|(name, done)| done.map(|done| (name, done)))
        .collect();
    Ok(result)
}

async fn run_subtasks(agent: &dyn Agent, subtasks: &[String]) -> BackendResult<Vec<String>> {
    let mut outputs = Vec::with_capacity(subtasks.len());
    for subtask in subtasks {
        info!("Delegating to {}: {}...", agent.name(), preview(subtask, 50));
        outputs.push(agent.run(subtask, None).await?);
    }
    debug!("{} finished {} subtasks", agent.name(), outputs.len());
    Ok(outputs)
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Results grouped by agent, numbered per subtask
pub fn format_results(result: &DelegationResult) -> String {
    let mut formatted = Vec::new();
    for (agent, outputs) in result.iter() {
        formatted.push(format!("\n=== {} ===", agent.to_uppercase()));
        for (i, output) in outputs.iter().enumerate() {
            formatted.push(format!("\nSubtask {}:\n{}\n", i + 1, output));
        }
    }
    formatted.join("\n")
}

/// One `- name: cap, cap` line per agent
pub fn format_capabilities(capabilities: &[(String, Vec<String>)]) -> String {
    capabilities
        .iter()
        .map(|(agent, caps)| format!("- {}: {}", agent, caps.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentConfig, CustomAgent};
    use crate::transport::InferenceTransport;
    use crate::transport::testing::ScriptedTransport;
    use std::time::{Duration, Instant};

    fn registry_with(transport: Arc<ScriptedTransport>, names: &[&str]) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for name in names {
            let transport: Arc<dyn InferenceTransport> = transport.clone();
            registry.register(Arc::new(CustomAgent::new(
                AgentConfig::new(*name, "m", "p"),
                transport,
                vec!["stuff".to_string()],
            )));
        }
        registry
    }

    #[test]
    fn test_delegation_mode_serde() {
        let json = serde_json::to_string(&DelegationMode::Concurrent).unwrap();
        assert_eq!(json, "\"concurrent\"");
        let mode: DelegationMode = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(mode, DelegationMode::Sequential);
    }

    #[test]
    fn test_delegation_options_default() {
        let options = DelegationOptions::default();
        assert_eq!(options.mode, DelegationMode::Sequential);
        assert_eq!(options.max_concurrent_agents, 4);
    }

    #[test]
    fn test_delegation_map_order_and_replace() {
        let mut map = DelegationMap::new()
            .assign("B", vec!["b1"])
            .assign("A", vec!["a1", "a2"])
            .assign("B", vec!["b2"]);
        map.push("A", "a3");
        map.push("C", "c1");

        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
        assert_eq!(map.get("B").unwrap(), ["b2".to_string()]);
        assert_eq!(map.get("A").unwrap().len(), 3);
        assert_eq!(map.subtask_count(), 5);
    }

    #[test]
    fn test_delegation_map_from_iter() {
        let map: DelegationMap = vec![("X", vec!["t1", "t2"])].into_iter().collect();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("X").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_runs_in_map_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let registry = registry_with(transport.clone(), &["A", "B"]);
        let map = DelegationMap::new()
            .assign("B", vec!["b1", "b2"])
            .assign("A", vec!["a1"]);

        let result = delegate(&registry, &map, &DelegationOptions::default())
            .await
            .unwrap();

        assert_eq!(transport.generate_prompts(), vec!["b1", "b2", "a1"]);
        assert_eq!(result.get("B").unwrap(), ["reply 1".to_string(), "reply 2".to_string()]);
        assert_eq!(result.get("A").unwrap(), ["reply 3".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        let registry = registry_with(transport.clone(), &["A"]);
        let map = DelegationMap::new()
            .assign("Ghost", vec!["t1", "t2"])
            .assign("A", vec!["a1"]);

        let result = delegate(&registry, &map, &DelegationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.skipped(), ["Ghost".to_string()]);
        assert!(result.get("Ghost").is_none());
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_aborts_on_first_error() {
        let transport = Arc::new(ScriptedTransport::failing_on(2));
        let registry = registry_with(transport.clone(), &["A", "B"]);
        let map = DelegationMap::new()
            .assign("A", vec!["a1", "a2", "a3"])
            .assign("B", vec!["b1"]);

        let err = delegate(&registry, &map, &DelegationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_preserves_per_agent_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let registry = registry_with(transport.clone(), &["A", "B", "C"]);
        let map = DelegationMap::new()
            .assign("A", vec!["a1", "a2", "a3"])
            .assign("B", vec!["b1", "b2"])
            .assign("Ghost", vec!["g1"])
            .assign("C", vec!["c1"]);
        let options = DelegationOptions {
            mode: DelegationMode::Concurrent,
            max_concurrent_agents: 2,
        };

        let result = delegate(&registry, &map, &options).await.unwrap();
        assert_eq!(transport.call_count(), 6);
        assert_eq!(result.skipped(), ["Ghost".to_string()]);

        let names: Vec<&str> = result.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        let prompts = transport.generate_prompts();
        let position = |p: &str| prompts.iter().position(|x| x == p).unwrap();
        assert!(position("a1") < position("a2"));
        assert!(position("a2") < position("a3"));
        assert!(position("b1") < position("b2"));
    }

    #[tokio::test]
    async fn test_concurrent_propagates_error() {
        let transport = Arc::new(ScriptedTransport::failing_on(1));
        let registry = registry_with(transport, &["A", "B"]);
        let map = DelegationMap::new()
            .assign("A", vec!["a1"])
            .assign("B", vec!["b1"]);
        let options = DelegationOptions {
            mode: DelegationMode::Concurrent,
            max_concurrent_agents: 1,
        };
        let err = delegate(&registry, &map, &options).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_failure_stops_other_agents() {
        let transport = Arc::new(
            ScriptedTransport::failing_prompt("b1").with_delay(Duration::from_millis(50)),
        );
        let registry = registry_with(transport.clone(), &["A", "B"]);
        let map = DelegationMap::new()
            .assign("A", vec!["a1", "a2", "a3", "a4", "a5"])
            .assign("B", vec!["b1"]);
        let options = DelegationOptions {
            mode: DelegationMode::Concurrent,
            max_concurrent_agents: 2,
        };

        let started = Instant::now();
        let err = delegate(&registry, &map, &options).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(started.elapsed() < Duration::from_millis(200));

        // A was mid-way through a1 when B failed; nothing after that point
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(transport.generate_prompts(), vec!["a1", "b1"]);
    }

    #[test]
    fn test_format_results() {
        let result = DelegationResult {
            entries: vec![
                ("Researcher".to_string(), vec!["Found 3 items".to_string()]),
                ("Coder".to_string(), vec!["fn a()".to_string(), "fn b()".to_string()]),
            ],
            skipped: vec![],
        };
        let formatted = format_results(&result);
        assert!(formatted.contains("=== RESEARCHER ==="));
        assert!(formatted.contains("Subtask 1:\nFound 3 items"));
        assert!(formatted.contains("=== CODER ==="));
        assert!(formatted.contains("Subtask 2:\nfn b()"));
        assert!(formatted.find("RESEARCHER").unwrap() < formatted.find("CODER").unwrap());
    }

    #[test]
    fn test_format_results_empty() {
        assert_eq!(format_results(&DelegationResult::default()), "");
    }

    #[test]
    fn test_format_capabilities() {
        let caps = vec![
            ("Coder".to_string(), vec!["Debugging".to_string(), "Review".to_string()]),
            ("Researcher".to_string(), vec!["Analysis".to_string()]),
        ];
        assert_eq!(
            format_capabilities(&caps),
            "- Coder: Debugging, Review\n- Researcher: Analysis"
        );
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo wörld", 4), "héll");
    }
}
