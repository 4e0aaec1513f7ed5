use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which provider serves a model, and under what name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider id as registered in the provider registry.
    pub provider: String,
    pub model: String,
    /// Optional endpoint override (self-hosted deployments).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ModelDescriptor {
    /// Parse a `"provider/model"` spec string.
    pub fn parse(spec: &str) -> Option<Self> {
        let (provider, model) = spec.split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.into(),
            model: model.into(),
            endpoint: None,
        })
    }
}

/// An agent's resolved execution configuration.
///
/// Built once at workflow start and immutable for the lifetime of the
/// execution; mid-flight config edits only affect later tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent_id: Uuid,
    pub name: String,
    /// System instruction prepended to every conversation.
    pub instruction: String,
    pub model: ModelDescriptor,
    /// MCP server ids whose tools this agent may use.
    #[serde(default)]
    pub tool_servers: Vec<String>,
    #[serde(default)]
    pub planning: bool,
    #[serde(default)]
    pub streaming: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_model_spec() {
        let md = ModelDescriptor::parse("openai/gpt-4o").unwrap();
        assert_eq!(md.provider, "openai");
        assert_eq!(md.model, "gpt-4o");
        assert!(md.endpoint.is_none());
    }

    #[test]
    fn parse_model_spec_with_slashes_in_model() {
        let md = ModelDescriptor::parse("vllm/qwen/qwen2.5-coder").unwrap();
        assert_eq!(md.provider, "vllm");
        assert_eq!(md.model, "qwen/qwen2.5-coder");
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        assert!(ModelDescriptor::parse("gpt-4o").is_none());
        assert!(ModelDescriptor::parse("/gpt-4o").is_none());
        assert!(ModelDescriptor::parse("openai/").is_none());
    }
}
