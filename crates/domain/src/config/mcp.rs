use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MCP tool servers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

/// One remote MCP tool server, spoken to over HTTP JSON-RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Stable id referenced by agent tool catalogs and tool descriptors.
    pub id: String,
    /// Base URL of the server's JSON-RPC endpoint.
    pub url: String,
    /// Name of the secret holding a bearer token, if the server requires one.
    #[serde(default)]
    pub auth_env: Option<String>,
    #[serde(default = "d_timeout")]
    pub timeout_secs: u64,
}

fn d_timeout() -> u64 {
    30
}
