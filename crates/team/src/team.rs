//! The name→agent map and shared toolset lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use ens_domain::error::{Error, Result};

use crate::agent::Agent;

/// A set of agents that can transfer work to each other.
pub struct Team {
    agents: HashMap<String, Arc<Agent>>,
}

impl Team {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: agents
                .into_iter()
                .map(|a| (a.name().to_string(), Arc::new(a)))
                .collect(),
        }
    }

    /// A team of one, used by the one-shot summarize/title runs.
    pub fn single(agent: Agent) -> Self {
        Self::new(vec![agent])
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Arc<Agent>> {
        self.get(name)
            .ok_or_else(|| Error::AgentNotFound(name.to_string()))
    }

    /// Agent names, sorted for stable display.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Start every toolset of every agent. Partial failures are logged
    /// and returned so callers can surface warnings; startup continues.
    pub async fn start_toolsets(&self) -> Vec<(String, Error)> {
        let mut failures = Vec::new();
        for agent in self.agents.values() {
            for toolset in agent.toolsets() {
                if let Err(e) = toolset.start().await {
                    tracing::warn!(
                        agent = agent.name(),
                        toolset = toolset.name(),
                        error = %e,
                        "toolset failed to start"
                    );
                    failures.push((toolset.name().to_string(), e));
                }
            }
        }
        failures
    }

    /// Stop every toolset. Errors are logged and swallowed; shutdown
    /// must not abort halfway.
    pub async fn stop_toolsets(&self) {
        for agent in self.agents.values() {
            for toolset in agent.toolsets() {
                if let Err(e) = toolset.stop().await {
                    tracing::warn!(
                        agent = agent.name(),
                        toolset = toolset.name(),
                        error = %e,
                        "toolset failed to stop"
                    );
                }
            }
        }
    }
}
