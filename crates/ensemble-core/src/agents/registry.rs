//! Capability registry: agents by display name, in registration order

use std::sync::Arc;
use tracing::info;

use super::base::Agent;

/// Name → agent mapping used by the coordinator for discovery.
///
/// Holds shared handles: callers keep their own `Arc` and may keep using the
/// agent directly. Registering a name twice replaces the earlier agent but
/// keeps its original position.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<(String, Arc<dyn Agent>)>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `agent` under its configured name. Returns the agent it replaced.
    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Option<Arc<dyn Agent>> {
        let name = agent.name().to_string();
        info!(
            "Agent {} registered ({} capabilities)",
            name,
            agent.capabilities().len()
        );
        match self.agents.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => Some(std::mem::replace(&mut entry.1, agent)),
            None => {
                self.agents.push((name, agent));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|(n, _)| n.clone()).collect()
    }

    /// `(name, capabilities)` for every agent
    pub fn capabilities(&self) -> Vec<(String, Vec<String>)> {
        self.agents
            .iter()
            .map(|(n, a)| (n.clone(), a.capabilities()))
            .collect()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Agent>> {
        let idx = self.agents.iter().position(|(n, _)| n == name)?;
        Some(self.agents.remove(idx).1)
    }

    pub fn count(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::base::CustomAgent;
    use crate::agents::profile::AgentConfig;
    use crate::transport::InferenceTransport;
    use crate::transport::testing::ScriptedTransport;

    fn agent(name: &str, model: &str) -> Arc<dyn Agent> {
        let transport: Arc<dyn InferenceTransport> = Arc::new(ScriptedTransport::new());
        Arc::new(CustomAgent::new(
            AgentConfig::new(name, model, "p"),
            transport,
            vec![format!("{} things", name)],
        ))
    }

    #[test]
    fn test_register_and_list_in_order() {
        let mut registry = AgentRegistry::new();
        assert!(registry.is_empty());
        registry.register(agent("Researcher", "m"));
        registry.register(agent("Coder", "m"));
        registry.register(agent("Writer", "m"));
        assert_eq!(registry.count(), 3);
        assert_eq!(registry.names(), vec!["Researcher", "Coder", "Writer"]);
    }

    #[test]
    fn test_same_name_last_registration_wins() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("Coder", "old-model"));
        registry.register(agent("Researcher", "m"));
        let replaced = registry.register(agent("Coder", "new-model"));

        assert_eq!(replaced.unwrap().config().model, "old-model");
        assert_eq!(registry.names(), vec!["Coder", "Researcher"]);
        assert_eq!(registry.get("Coder").unwrap().config().model, "new-model");
    }

    #[test]
    fn test_registry_shares_ownership() {
        let mut registry = AgentRegistry::new();
        let coder = agent("Coder", "m");
        registry.register(coder.clone());
        assert_eq!(Arc::strong_count(&coder), 2);
        assert!(Arc::ptr_eq(registry.get("Coder").unwrap(), &coder));
    }

    #[test]
    fn test_capabilities_and_remove() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("Coder", "m"));
        assert_eq!(
            registry.capabilities(),
            vec![("Coder".to_string(), vec!["Coder things".to_string()])]
        );
        assert!(registry.contains("Coder"));
        assert!(registry.remove("Coder").is_some());
        assert!(registry.remove("Coder").is_none());
        assert!(!registry.contains("Coder"));
    }
}
