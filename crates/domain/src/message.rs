use serde::{Deserialize, Serialize};

/// A structured request from the model to run a named tool.
///
/// `arguments` is always a JSON-encoded string — the response parser
/// normalizes whatever the provider produced (object, bare value, or raw
/// text) into this form before the workflow sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// A turn in the conversation history carried inside the workflow.
///
/// Explicit sum type: variant-specific fields instead of role strings.
/// Wire conversion to/from provider formats happens at the adapter
/// boundary, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        content: String,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: text.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            success,
            content: content.into(),
        }
    }

    /// The textual content of the message, regardless of variant.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tag_serialization() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn assistant_without_tool_calls_omits_field() {
        let msg = Message::assistant("hi", vec![]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn assistant_with_tool_calls_roundtrip() {
        let msg = Message::assistant(
            "",
            vec![ToolCall::new("tc_1", "calculator", r#"{"expression":"1+1"}"#)],
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        match back {
            Message::Assistant { tool_calls, .. } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "calculator");
            }
            _ => panic!("expected Assistant variant"),
        }
    }

    #[test]
    fn tool_message_carries_call_linkage() {
        let msg = Message::tool_result("tc_9", "search", false, "no results");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "tc_9");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn content_accessor_covers_all_variants() {
        assert_eq!(Message::system("s").content(), "s");
        assert_eq!(Message::user("u").content(), "u");
        assert_eq!(Message::assistant("a", vec![]).content(), "a");
        assert_eq!(Message::tool_result("id", "t", true, "c").content(), "c");
    }
}
