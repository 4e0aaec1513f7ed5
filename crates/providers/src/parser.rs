//! Assistant-response parsing: turning whatever the model produced into
//! canonical [`ToolCall`]s.
//!
//! Models do not reliably use structured tool calls. The extraction runs in
//! stages:
//! 1. **Structured** — normalize the provider's `tool_calls` array.
//! 2. **Content-embedded** (only when stage 1 yields nothing) — parse the
//!    whole content as a JSON `task_complete` call, then regex-scan for an
//!    embedded one, then fall back on the bare `task_complete` token.
//!
//! Streaming responses are assembled per tool-call index before the same
//! argument validation is applied.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use ah_domain::message::ToolCall;
use ah_domain::tool::TASK_COMPLETE;

use crate::traits::RawToolCall;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Extract tool calls from an assistant response: structured pass first,
/// content-embedded fallback only when the structured pass yields none.
pub fn extract_tool_calls(structured: &[RawToolCall], content: &str) -> Vec<ToolCall> {
    if !structured.is_empty() {
        return structured
            .iter()
            .enumerate()
            .map(|(i, raw)| ToolCall {
                id: raw.id.clone().unwrap_or_else(|| format!("call_{i}")),
                name: raw.name.clone(),
                arguments: normalize_arguments(&raw.arguments),
            })
            .collect();
    }

    extract_from_content(content)
}

/// Force `arguments` into a JSON-encoded string.
///
/// Objects pass through; strings are kept when they already encode an
/// object; every other shape is wrapped as `{"value": …}`.
pub fn normalize_arguments(args: &Value) -> String {
    match args {
        Value::Object(_) => args.to_string(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(_)) => s.clone(),
            Ok(other) => json!({ "value": other }).to_string(),
            Err(_) => {
                if s.trim().is_empty() {
                    "{}".to_string()
                } else {
                    json!({ "value": s }).to_string()
                }
            }
        },
        Value::Null => "{}".to_string(),
        other => json!({ "value": other }).to_string(),
    }
}

/// A fresh id for a call synthesized from free-text content.
fn extracted_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("extracted_{}", &uuid[..8])
}

fn embedded_call_regexes() -> &'static [Regex; 2] {
    static RE: OnceLock<[Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            // {"name": "task_complete", "arguments": {...}}
            Regex::new(
                r#"(?is)\{\s*["']name["']\s*:\s*["']task_complete["']\s*,\s*["']arguments["']\s*:\s*(\{[^}]*\})\s*\}"#,
            )
            .expect("embedded tool-call regex"),
            // Looser: the name/arguments pair without the outer braces.
            Regex::new(
                r#"(?is)["']name["']\s*:\s*["']task_complete["']\s*,\s*["']arguments["']\s*:\s*(\{[^}]*\})"#,
            )
            .expect("loose embedded tool-call regex"),
        ]
    })
}

/// Content-embedded extraction (stage 2): models sometimes emit the
/// completion call as JSON text instead of a structured tool call.
fn extract_from_content(content: &str) -> Vec<ToolCall> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    // Whole content is a JSON task_complete call.
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        if map.get("name").and_then(|v| v.as_str()) == Some(TASK_COMPLETE) {
            let arguments = map
                .get("arguments")
                .map(normalize_arguments)
                .unwrap_or_else(|| "{}".into());
            return vec![ToolCall {
                id: extracted_id(),
                name: TASK_COMPLETE.into(),
                arguments,
            }];
        }
    }

    // Regex scan for an embedded call structure.
    for re in embedded_call_regexes() {
        if let Some(caps) = re.captures(content) {
            let args_text = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("{}");
            let arguments = match serde_json::from_str::<Value>(args_text) {
                Ok(v @ Value::Object(_)) => v.to_string(),
                _ => json!({ "result": args_text }).to_string(),
            };
            return vec![ToolCall {
                id: extracted_id(),
                name: TASK_COMPLETE.into(),
                arguments,
            }];
        }
    }

    // Last resort: the model mentioned task_complete but gave no structure.
    if content.to_lowercase().contains(TASK_COMPLETE) {
        return vec![ToolCall {
            id: extracted_id(),
            name: TASK_COMPLETE.into(),
            arguments: json!({ "result": trimmed }).to_string(),
        }];
    }

    Vec::new()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates chunked tool-call fragments keyed by stream index.
///
/// Argument deltas concatenate; non-null id/name overrides are taken as
/// they arrive. `finish` applies the same wrap-or-textify recovery as the
/// non-streaming path.
#[derive(Default)]
pub struct StreamingToolCalls {
    by_index: BTreeMap<u32, PartialCall>,
}

impl StreamingToolCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Record the start of a tool call (id and name known).
    pub fn start(&mut self, index: u32, id: &str, name: &str) {
        let entry = self.by_index.entry(index).or_default();
        if !id.is_empty() {
            entry.id = Some(id.to_string());
        }
        if !name.is_empty() {
            entry.name = name.to_string();
        }
    }

    /// Append an argument fragment for the call at `index`.
    pub fn delta(&mut self, index: u32, fragment: &str) {
        self.by_index
            .entry(index)
            .or_default()
            .arguments
            .push_str(fragment);
    }

    /// Finish assembly: validate each call's arguments, recovering invalid
    /// JSON as `{"text": <raw>}` and wrapping bare values as `{"value": …}`.
    pub fn finish(self) -> Vec<ToolCall> {
        self.by_index
            .into_values()
            .filter(|p| !p.name.is_empty())
            .map(|p| {
                let raw = p.arguments.trim();
                let arguments = if raw.is_empty() {
                    "{}".to_string()
                } else {
                    match serde_json::from_str::<Value>(raw) {
                        Ok(Value::Object(_)) => raw.to_string(),
                        Ok(other) => json!({ "value": other }).to_string(),
                        Err(_) => json!({ "text": raw }).to_string(),
                    }
                };
                ToolCall {
                    id: p.id.unwrap_or_else(extracted_id),
                    name: p.name,
                    arguments,
                }
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, name: &str, args: Value) -> RawToolCall {
        RawToolCall {
            id: Some(id.into()),
            name: name.into(),
            arguments: args,
        }
    }

    // ── Structured pass ────────────────────────────────────────────

    #[test]
    fn structured_object_arguments_pass_through() {
        let calls = extract_tool_calls(
            &[raw("c1", "search", json!({"query": "rust"}))],
            "ignored",
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].name, "search");
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["query"], "rust");
    }

    #[test]
    fn structured_string_arguments_kept_when_object() {
        let calls = extract_tool_calls(
            &[raw("c1", "calc", Value::String(r#"{"expression":"1+1"}"#.into()))],
            "",
        );
        assert_eq!(calls[0].arguments, r#"{"expression":"1+1"}"#);
    }

    #[test]
    fn structured_non_object_values_wrapped() {
        let calls = extract_tool_calls(&[raw("c1", "echo", json!(42))], "");
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["value"], 42);

        let calls = extract_tool_calls(
            &[raw("c2", "echo", Value::String("plain words".into()))],
            "",
        );
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["value"], "plain words");
    }

    #[test]
    fn structured_missing_id_gets_positional_fallback() {
        let calls = extract_tool_calls(
            &[RawToolCall {
                id: None,
                name: "search".into(),
                arguments: json!({}),
            }],
            "",
        );
        assert_eq!(calls[0].id, "call_0");
    }

    #[test]
    fn structured_pass_suppresses_content_fallback() {
        // Content mentions task_complete, but structured calls win.
        let calls = extract_tool_calls(
            &[raw("c1", "search", json!({}))],
            r#"{"name":"task_complete","arguments":{"result":"x","success":true}}"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
    }

    // ── Content-embedded fallback ──────────────────────────────────

    #[test]
    fn whole_content_json_task_complete() {
        let content = r#"{"name":"task_complete","arguments":{"result":"ok","success":true}}"#;
        let calls = extract_tool_calls(&[], content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "task_complete");
        assert!(calls[0].id.starts_with("extracted_"));
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["result"], "ok");
        assert_eq!(parsed["success"], true);
    }

    #[test]
    fn whole_content_json_other_tool_is_ignored() {
        let content = r#"{"name":"calculator","arguments":{"expression":"1+1"}}"#;
        let calls = extract_tool_calls(&[], content);
        assert!(calls.is_empty());
    }

    #[test]
    fn embedded_call_inside_prose() {
        let content = concat!(
            "I believe we are done here.\n",
            r#"{"name": "task_complete", "arguments": {"result": "42", "success": true}}"#,
            "\nLet me know if anything else is needed."
        );
        let calls = extract_tool_calls(&[], content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "task_complete");
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["result"], "42");
    }

    #[test]
    fn bare_token_fallback_wraps_content_as_result() {
        let content = "All finished — calling task_complete now.";
        let calls = extract_tool_calls(&[], content);
        assert_eq!(calls.len(), 1);
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["result"], content);
    }

    #[test]
    fn plain_answer_extracts_nothing() {
        assert!(extract_tool_calls(&[], "The answer is 42.").is_empty());
        assert!(extract_tool_calls(&[], "").is_empty());
        assert!(extract_tool_calls(&[], "   ").is_empty());
    }

    #[test]
    fn extracted_ids_are_fresh() {
        let content = r#"{"name":"task_complete","arguments":{"result":"x"}}"#;
        let a = extract_tool_calls(&[], content);
        let b = extract_tool_calls(&[], content);
        assert_ne!(a[0].id, b[0].id);
    }

    // ── normalize_arguments ────────────────────────────────────────

    #[test]
    fn normalize_null_and_empty() {
        assert_eq!(normalize_arguments(&Value::Null), "{}");
        assert_eq!(normalize_arguments(&Value::String("".into())), "{}");
        assert_eq!(normalize_arguments(&Value::String("  ".into())), "{}");
    }

    #[test]
    fn normalize_encoded_array_wrapped() {
        let out = normalize_arguments(&Value::String("[1,2]".into()));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["value"], json!([1, 2]));
    }

    // ── Streaming assembly ─────────────────────────────────────────

    #[test]
    fn streaming_concatenates_deltas() {
        let mut acc = StreamingToolCalls::new();
        acc.start(0, "call_1", "calculator");
        acc.delta(0, r#"{"expres"#);
        acc.delta(0, r#"sion":"15+27"}"#);

        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["expression"], "15+27");
    }

    #[test]
    fn streaming_multiple_indexes_preserve_order() {
        let mut acc = StreamingToolCalls::new();
        acc.start(1, "call_b", "second");
        acc.start(0, "call_a", "first");
        acc.delta(0, "{}");
        acc.delta(1, "{}");

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "first");
        assert_eq!(calls[1].name, "second");
    }

    #[test]
    fn streaming_invalid_json_recovered_as_text() {
        let mut acc = StreamingToolCalls::new();
        acc.start(0, "call_1", "notes");
        acc.delta(0, "not json at all");

        let calls = acc.finish();
        let parsed: Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(parsed["text"], "not json at all");
    }

    #[test]
    fn streaming_empty_arguments_default_to_object() {
        let mut acc = StreamingToolCalls::new();
        acc.start(0, "call_1", "ping");
        let calls = acc.finish();
        assert_eq!(calls[0].arguments, "{}");
    }

    #[test]
    fn streaming_late_name_override_taken() {
        let mut acc = StreamingToolCalls::new();
        acc.delta(0, r#"{"x":1}"#);
        acc.start(0, "call_1", "late_name");
        let calls = acc.finish();
        assert_eq!(calls[0].name, "late_name");
    }

    #[test]
    fn streaming_nameless_entries_dropped() {
        let mut acc = StreamingToolCalls::new();
        acc.delta(0, r#"{"x":1}"#);
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn streaming_missing_id_gets_extracted_id() {
        let mut acc = StreamingToolCalls::new();
        acc.start(0, "", "tool");
        let calls = acc.finish();
        assert!(calls[0].id.starts_with("extracted_"));
    }

    // ── Round-trip law ─────────────────────────────────────────────

    #[test]
    fn structured_roundtrip_up_to_id_normalization() {
        let original = vec![
            raw("c1", "search", json!({"query": "rust"})),
            raw("c2", "calc", json!({"expression": "1+1"})),
        ];
        let extracted = extract_tool_calls(&original, "");
        for (orig, got) in original.iter().zip(&extracted) {
            assert_eq!(orig.id.as_deref().unwrap(), got.id);
            assert_eq!(orig.name, got.name);
            let orig_args = &orig.arguments;
            let got_args: Value = serde_json::from_str(&got.arguments).unwrap();
            assert_eq!(orig_args, &got_args);
        }
    }
}
