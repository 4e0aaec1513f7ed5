//! Tool execution: schema validation, then builtin or remote dispatch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use ah_domain::tool::{ToolDescriptor, ToolOutcome, TASK_COMPLETE};
use ah_mcp_client::McpManager;

use crate::schema;

/// Dispatches tool calls for workflow executions.
///
/// The executor never fails the workflow: every path, including transport
/// errors and cancellation, is folded into a [`ToolOutcome`]. The workflow
/// records failed outcomes as `success=false` tool messages and moves on.
pub struct ToolExecutor {
    mcp: Arc<McpManager>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(mcp: Arc<McpManager>, timeout: Duration) -> Self {
        Self { mcp, timeout }
    }

    /// Execute one tool call against its resolved descriptor.
    ///
    /// Arguments are validated against the descriptor's schema before any
    /// dispatch; a violation never reaches the backend. A pending remote
    /// invocation is abandoned when `cancel` fires, after a best-effort
    /// notification to the server.
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        args: &Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let violations = schema::validate(args, descriptor.schema());
        if !violations.is_empty() {
            tracing::debug!(
                tool = descriptor.name(),
                violations = ?violations,
                "tool arguments rejected by schema"
            );
            return ToolOutcome {
                tool_name: descriptor.name().to_string(),
                success: false,
                result: Value::Null,
                error: Some(format!("schema_violation: {}", violations.join("; "))),
            };
        }

        match descriptor {
            ToolDescriptor::Builtin { name, .. } => self.execute_builtin(name, args),
            ToolDescriptor::Remote {
                name, server_id, ..
            } => self.execute_remote(name, server_id, args, cancel).await,
        }
    }

    // ── Builtin dispatch ───────────────────────────────────────────

    fn execute_builtin(&self, name: &str, args: &Value) -> ToolOutcome {
        match name {
            // Normally intercepted by the workflow before dispatch; handled
            // here as well so a direct invocation still acknowledges.
            TASK_COMPLETE => ToolOutcome::ok(
                TASK_COMPLETE,
                args.get("result").cloned().unwrap_or(Value::Null),
            ),
            other => ToolOutcome::err(other, format!("unknown builtin tool '{other}'")),
        }
    }

    // ── Remote (MCP) dispatch ──────────────────────────────────────

    async fn execute_remote(
        &self,
        name: &str,
        server_id: &str,
        args: &Value,
        cancel: &CancellationToken,
    ) -> ToolOutcome {
        let call = self.mcp.call_tool(server_id, name, args.clone());
        let call = tokio::time::timeout(self.timeout, call);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(tool = name, server_id, "tool call abandoned on cancellation");
                self.mcp.notify_cancelled(server_id, name).await;
                return ToolOutcome::err(name, "cancelled");
            }
            result = call => result,
        };

        match result {
            Ok(Ok(call_result)) => {
                if call_result.is_error {
                    ToolOutcome::err(name, call_result.text())
                } else {
                    ToolOutcome::ok(name, Value::String(call_result.text()))
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = name, server_id, error = %e, "tool call failed");
                ToolOutcome::err(name, e.to_string())
            }
            Err(_) => {
                tracing::warn!(tool = name, server_id, "tool call timed out");
                ToolOutcome::err(name, format!("timeout after {:?}", self.timeout))
            }
        }
    }
}
