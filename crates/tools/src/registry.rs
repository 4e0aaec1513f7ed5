//! Tool catalog resolution.
//!
//! An agent's catalog is resolved once at workflow startup: every tool
//! discovered on the agent's MCP servers becomes a `Remote` descriptor, and
//! the builtin `task_complete` descriptor is always present.

use std::collections::HashMap;

use ah_domain::agent::AgentConfig;
use ah_domain::tool::{ToolDescriptor, TASK_COMPLETE};
use ah_mcp_client::McpManager;

/// The resolved tool catalog for one workflow execution.
///
/// Preserves resolution order (the order descriptors are offered to the
/// model) with an index for by-name dispatch.
pub struct ToolCatalog {
    descriptors: Vec<ToolDescriptor>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    /// Build a catalog from descriptors, appending `task_complete` if
    /// absent. Later duplicates of a name are dropped.
    pub fn new(mut descriptors: Vec<ToolDescriptor>) -> Self {
        if !descriptors.iter().any(|d| d.name() == TASK_COMPLETE) {
            descriptors.push(ToolDescriptor::task_complete());
        }

        let mut by_name = HashMap::new();
        let mut deduped = Vec::with_capacity(descriptors.len());
        for desc in descriptors {
            if by_name.contains_key(desc.name()) {
                tracing::warn!(tool = desc.name(), "duplicate tool name in catalog, dropping");
                continue;
            }
            by_name.insert(desc.name().to_string(), deduped.len());
            deduped.push(desc);
        }

        Self {
            descriptors: deduped,
            by_name,
        }
    }

    /// Resolve the catalog for an agent from its configured MCP servers.
    pub fn resolve(agent: &AgentConfig, mcp: &McpManager) -> Self {
        let mut descriptors = Vec::new();

        for server_id in &agent.tool_servers {
            let tools = mcp.server_tools(server_id);
            if tools.is_empty() {
                tracing::warn!(
                    agent = %agent.name,
                    server_id = %server_id,
                    "agent references an MCP server with no discovered tools"
                );
            }
            for tool in tools {
                descriptors.push(ToolDescriptor::Remote {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    schema: tool.input_schema.clone(),
                    server_id: server_id.clone(),
                });
            }
        }

        Self::new(descriptors)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(name: &str, server: &str) -> ToolDescriptor {
        ToolDescriptor::Remote {
            name: name.into(),
            description: String::new(),
            schema: json!({"type": "object"}),
            server_id: server.into(),
        }
    }

    #[test]
    fn task_complete_always_present() {
        let catalog = ToolCatalog::new(vec![]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(TASK_COMPLETE).is_some());
    }

    #[test]
    fn task_complete_not_duplicated() {
        let catalog = ToolCatalog::new(vec![ToolDescriptor::task_complete()]);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn catalog_preserves_order_and_indexes_by_name() {
        let catalog = ToolCatalog::new(vec![remote("search", "s1"), remote("fetch", "s1")]);
        assert_eq!(catalog.descriptors()[0].name(), "search");
        assert_eq!(catalog.descriptors()[1].name(), "fetch");
        assert_eq!(catalog.descriptors()[2].name(), TASK_COMPLETE);
        assert!(catalog.get("fetch").is_some());
        assert!(catalog.get("ghost").is_none());
    }

    #[test]
    fn duplicate_names_keep_first() {
        let catalog = ToolCatalog::new(vec![remote("search", "s1"), remote("search", "s2")]);
        assert_eq!(catalog.len(), 2); // search + task_complete
        match catalog.get("search").unwrap() {
            ToolDescriptor::Remote { server_id, .. } => assert_eq!(server_id, "s1"),
            _ => panic!("expected Remote descriptor"),
        }
    }
}
