mod agents;
mod llm;
mod mcp;
mod server;
mod workflow;

pub use agents::*;
pub use llm::*;
pub use mcp::*;
pub use server::*;
pub use workflow::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    /// MCP (Model Context Protocol) tool-server connections.
    #[serde(default)]
    pub mcp: McpConfig,
    /// Registered agent definitions.
    #[serde(default)]
    pub agents: Vec<AgentDefinition>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Environment variable holding the JWT HS256 signing secret.
    /// When the env var is unset, auth runs in dev mode: requests without a
    /// token get a default user/workspace context.
    #[serde(default = "d_jwt_secret_env")]
    pub jwt_secret_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_env: d_jwt_secret_env(),
        }
    }
}

fn d_jwt_secret_env() -> String {
    "AH_JWT_SECRET".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the loaded configuration, returning every issue found.
    ///
    /// Errors make startup abort; warnings are logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let error = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message,
        };
        let warn = |field: &str, message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message,
        };

        // Provider ids must be unique and referenced models resolvable.
        let mut provider_ids = HashSet::new();
        for p in &self.llm.providers {
            if !provider_ids.insert(p.id.as_str()) {
                issues.push(error("llm.providers", format!("duplicate provider id '{}'", p.id)));
            }
            if p.base_url.is_empty() {
                issues.push(error(
                    "llm.providers",
                    format!("provider '{}' has an empty base_url", p.id),
                ));
            }
        }

        // MCP server ids must be unique.
        let mut server_ids = HashSet::new();
        for s in &self.mcp.servers {
            if !server_ids.insert(s.id.as_str()) {
                issues.push(error("mcp.servers", format!("duplicate server id '{}'", s.id)));
            }
        }

        // Agents must be unique and reference known providers/servers.
        let mut agent_ids = HashSet::new();
        for a in &self.agents {
            if !agent_ids.insert(a.id) {
                issues.push(error("agents", format!("duplicate agent id '{}'", a.id)));
            }
            match a.model.split_once('/') {
                Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                    if !provider_ids.contains(provider) {
                        issues.push(warn(
                            "agents",
                            format!("agent '{}' references unknown provider '{provider}'", a.name),
                        ));
                    }
                }
                _ => issues.push(error(
                    "agents",
                    format!("agent '{}' model must be 'provider/model', got '{}'", a.name, a.model),
                )),
            }
            for server in &a.tool_servers {
                if !server_ids.contains(server.as_str()) {
                    issues.push(warn(
                        "agents",
                        format!("agent '{}' references unknown MCP server '{server}'", a.name),
                    ));
                }
            }
        }

        if let Some(goal_model) = &self.workflow.goal_model {
            if goal_model.split_once('/').is_none() {
                issues.push(error(
                    "workflow.goal_model",
                    format!("must be 'provider/model', got '{goal_model}'"),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.workflow.goal_confidence_threshold) {
            issues.push(error(
                "workflow.goal_confidence_threshold",
                format!("must be within 0.0..=1.0, got {}", self.workflow.goal_confidence_threshold),
            ));
        }

        if self.workflow.default_max_iterations > self.workflow.hard_iteration_cap {
            issues.push(warn(
                "workflow.default_max_iterations",
                format!(
                    "default ({}) exceeds the hard cap ({}); the cap wins",
                    self.workflow.default_max_iterations, self.workflow.hard_iteration_cap
                ),
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
