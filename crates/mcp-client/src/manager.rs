//! MCP manager — holds all tool-server connections and orchestrates tool
//! discovery and dispatch.

use std::collections::HashMap;

use serde_json::Value;

use ah_domain::config::{McpConfig, McpServerConfig};

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{HttpTransport, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One connected MCP server: handshake done, tools discovered.
pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: HttpTransport,
}

impl McpServer {
    /// Connect, perform the MCP handshake, and discover tools.
    async fn initialize(
        config: &McpServerConfig,
        bearer: Option<String>,
    ) -> Result<Self, McpError> {
        let transport = HttpTransport::connect(config, bearer)?;

        let resp = transport
            .request("initialize", Some(protocol::initialize_params()))
            .await?;
        resp.into_result()
            .map_err(|e| McpError::Protocol(format!("initialize failed: {e}")))?;

        transport
            .notify("notifications/initialized", None)
            .await?;

        let tools_resp = transport.request("tools/list", None).await?;
        let tools = match tools_resp.into_result() {
            Ok(value) => match serde_json::from_value::<ToolsListResult>(value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(
                        server_id = %config.id,
                        error = %e,
                        "failed to parse tools/list result"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(
                    server_id = %config.id,
                    error = %e,
                    "tools/list returned an error, server will have no tools"
                );
                Vec::new()
            }
        };

        tracing::info!(
            server_id = %config.id,
            tool_count = tools.len(),
            "MCP server initialized"
        );

        Ok(Self {
            id: config.id.clone(),
            tools,
            transport,
        })
    }

    /// Call a tool on this server.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });

        let resp = self.transport.request("tools/call", Some(params)).await?;
        let value = resp
            .into_result()
            .map_err(|e| McpError::Protocol(format!("tools/call failed: {e}")))?;

        serde_json::from_value(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    /// Best-effort notification that an in-flight call was abandoned.
    pub async fn notify_cancelled(&self, tool_name: &str) {
        let params = serde_json::json!({ "reason": "workflow_cancelled", "tool": tool_name });
        if let Err(e) = self
            .transport
            .notify("notifications/cancelled", Some(params))
            .await
        {
            tracing::debug!(server_id = %self.id, error = %e, "cancel notification not delivered");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Manager that holds all MCP server connections.
pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    /// Create an empty manager (no MCP servers configured).
    pub fn empty() -> Self {
        Self {
            servers: HashMap::new(),
        }
    }

    /// Initialize from config: connect, handshake, discover tools.
    ///
    /// `resolve_auth` maps a server's `auth_env` name to a token. Servers
    /// that fail to initialize are logged and skipped (not fatal).
    pub async fn from_config(
        config: &McpConfig,
        resolve_auth: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut servers = HashMap::new();

        for server_config in &config.servers {
            let bearer = server_config
                .auth_env
                .as_deref()
                .and_then(&resolve_auth);

            tracing::info!(
                server_id = %server_config.id,
                url = %server_config.url,
                "initializing MCP server"
            );

            match McpServer::initialize(server_config, bearer).await {
                Ok(server) => {
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(
                        server_id = %server_config.id,
                        error = %e,
                        "failed to initialize MCP server, skipping"
                    );
                }
            }
        }

        Self { servers }
    }

    /// All discovered tools for the given server.
    pub fn server_tools(&self, server_id: &str) -> &[McpToolDef] {
        self.servers
            .get(server_id)
            .map(|s| s.tools.as_slice())
            .unwrap_or(&[])
    }

    /// All discovered tools across all servers as `(server_id, tool)`.
    pub fn list_tools(&self) -> Vec<(&str, &McpToolDef)> {
        self.servers
            .values()
            .flat_map(|server| server.tools.iter().map(move |t| (server.id.as_str(), t)))
            .collect()
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let server = self
            .servers
            .get(server_id)
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    /// Tell a server its in-flight call was abandoned (fire-and-forget).
    pub async fn notify_cancelled(&self, server_id: &str, tool_name: &str) {
        if let Some(server) = self.servers.get(server_id) {
            server.notify_cancelled(tool_name).await;
        }
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().map(|s| s.tools.len()).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),
}

impl From<McpError> for ah_domain::error::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Transport(TransportError::Timeout(msg)) => {
                ah_domain::error::Error::Timeout(msg)
            }
            McpError::Transport(TransportError::Status { status, body }) if status >= 500 => {
                ah_domain::error::Error::Http(format!("HTTP {status}: {body}"))
            }
            other => ah_domain::error::Error::Tool {
                tool: "mcp".into(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_has_no_tools() {
        let manager = McpManager::empty();
        assert_eq!(manager.server_count(), 0);
        assert_eq!(manager.tool_count(), 0);
        assert!(manager.list_tools().is_empty());
        assert!(manager.server_tools("ghost").is_empty());
    }

    #[tokio::test]
    async fn call_on_unknown_server_errors() {
        let manager = McpManager::empty();
        let err = manager
            .call_tool("ghost", "read_file", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ServerNotFound(_)));
    }

    #[test]
    fn transport_timeout_maps_to_domain_timeout() {
        let err: ah_domain::error::Error =
            McpError::Transport(TransportError::Timeout("t".into())).into();
        assert!(matches!(err, ah_domain::error::Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn protocol_error_maps_to_tool_error() {
        let err: ah_domain::error::Error = McpError::Protocol("bad".into()).into();
        assert!(matches!(err, ah_domain::error::Error::Tool { .. }));
        assert!(!err.is_retryable());
    }
}
