use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent definitions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A registered agent: a named model + instruction + tool catalog,
/// addressable by UUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// System instruction prepended to every task conversation.
    pub instruction: String,
    /// Format: "provider_id/model_name".
    pub model: String,
    /// Optional endpoint override for the model.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// MCP server ids whose tools this agent may invoke.
    #[serde(default)]
    pub tool_servers: Vec<String>,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub planning: bool,
    /// Budget applied when the submission does not carry one.
    #[serde(default = "d_budget")]
    pub default_budget_usd: f64,
}

fn d_budget() -> f64 {
    1.0
}
