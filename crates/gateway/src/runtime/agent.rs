//! Agent registry — the configured agents addressable by UUID.
//!
//! Definitions come from config at startup. Resolution produces the
//! immutable [`AgentConfig`] a workflow execution runs with.

use std::collections::HashMap;

use uuid::Uuid;

use ah_domain::agent::{AgentConfig, ModelDescriptor};
use ah_domain::config::AgentDefinition;
use ah_domain::error::{Error, Result};

pub struct AgentRegistry {
    agents: HashMap<Uuid, AgentDefinition>,
}

impl AgentRegistry {
    pub fn from_config(definitions: &[AgentDefinition]) -> Self {
        let mut agents = HashMap::new();
        for def in definitions {
            tracing::info!(
                agent_id = %def.id,
                name = %def.name,
                model = %def.model,
                tool_servers = ?def.tool_servers,
                "registered agent"
            );
            agents.insert(def.id, def.clone());
        }
        Self { agents }
    }

    pub fn get(&self, agent_id: &Uuid) -> Option<&AgentDefinition> {
        self.agents.get(agent_id)
    }

    /// All definitions, sorted by name for stable listings.
    pub fn list(&self) -> Vec<&AgentDefinition> {
        let mut defs: Vec<_> = self.agents.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Resolve a definition into the execution config a workflow runs with.
    pub fn resolve_config(&self, agent_id: &Uuid) -> Result<AgentConfig> {
        let def = self
            .agents
            .get(agent_id)
            .ok_or(Error::AgentNotFound(*agent_id))?;

        let mut model = ModelDescriptor::parse(&def.model).ok_or_else(|| {
            Error::Config(format!(
                "agent '{}' has malformed model spec '{}'",
                def.name, def.model
            ))
        })?;
        model.endpoint = def.endpoint.clone();

        Ok(AgentConfig {
            agent_id: def.id,
            name: def.name.clone(),
            instruction: def.instruction.clone(),
            model,
            tool_servers: def.tool_servers.clone(),
            planning: def.planning,
            streaming: def.streaming,
        })
    }
}
