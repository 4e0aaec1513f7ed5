use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The built-in tool whose invocation with `success=true` is the canonical
/// completion signal for every workflow.
pub const TASK_COMPLETE: &str = "task_complete";

/// A tool the model may invoke, resolved once per workflow execution.
///
/// Tagged variant so the executor can dispatch without inspecting untyped
/// maps: builtins run in-process, remote tools go through the MCP adapter
/// identified by `server_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ToolDescriptor {
    Builtin {
        name: String,
        description: String,
        /// JSON Schema for the tool's arguments.
        schema: Value,
    },
    Remote {
        name: String,
        description: String,
        schema: Value,
        /// The MCP server this tool is served by.
        server_id: String,
    },
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        match self {
            ToolDescriptor::Builtin { name, .. } | ToolDescriptor::Remote { name, .. } => name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            ToolDescriptor::Builtin { description, .. }
            | ToolDescriptor::Remote { description, .. } => description,
        }
    }

    pub fn schema(&self) -> &Value {
        match self {
            ToolDescriptor::Builtin { schema, .. } | ToolDescriptor::Remote { schema, .. } => {
                schema
            }
        }
    }

    /// The always-present completion tool.
    pub fn task_complete() -> Self {
        ToolDescriptor::Builtin {
            name: TASK_COMPLETE.into(),
            description: "Signal that the task is finished. Call with success=true and \
                          the final result once the goal is met."
                .into(),
            schema: json!({
                "type": "object",
                "properties": {
                    "result": {
                        "type": "string",
                        "description": "The final answer or outcome of the task."
                    },
                    "success": {
                        "type": "boolean",
                        "description": "Whether the task goal was achieved."
                    }
                },
                "required": ["result", "success"]
            }),
        }
    }
}

/// The structured result of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub success: bool,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(tool_name: impl Into<String>, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result,
            error: None,
        }
    }

    pub fn err(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    /// The outcome rendered as tool-message content for the conversation.
    pub fn content(&self) -> String {
        if self.success {
            match &self.result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        } else {
            self.error.clone().unwrap_or_else(|| "tool failed".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_complete_descriptor_shape() {
        let desc = ToolDescriptor::task_complete();
        assert_eq!(desc.name(), "task_complete");
        let required = desc.schema()["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "result"));
        assert!(required.iter().any(|v| v == "success"));
    }

    #[test]
    fn descriptor_tag_serialization() {
        let desc = ToolDescriptor::Remote {
            name: "read_file".into(),
            description: "Read a file".into(),
            schema: json!({"type": "object"}),
            server_id: "filesystem".into(),
        };
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["source"], "remote");
        assert_eq!(json["server_id"], "filesystem");
    }

    #[test]
    fn outcome_content_prefers_plain_strings() {
        let ok = ToolOutcome::ok("calc", json!("42"));
        assert_eq!(ok.content(), "42");

        let structured = ToolOutcome::ok("calc", json!({"value": 42}));
        assert_eq!(structured.content(), r#"{"value":42}"#);

        let failed = ToolOutcome::err("calc", "division by zero");
        assert_eq!(failed.content(), "division by zero");
        assert!(!failed.success);
    }
}
