//! Argument validation against a tool descriptor's JSON schema.
//!
//! Covers the subset of JSON Schema that tool definitions actually use:
//! top-level object shape, `required` properties, per-property `type`, and
//! `enum` membership. Anything the schema does not constrain passes.

use serde_json::Value;

/// Validate `args` against `schema`. Returns every violation found.
pub fn validate(args: &Value, schema: &Value) -> Vec<String> {
    let mut violations = Vec::new();

    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !args.is_object() {
        violations.push(format!(
            "expected an object, got {}",
            type_name(args)
        ));
        return violations;
    }

    let obj = match args.as_object() {
        Some(o) => o,
        None => return violations,
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(field) {
                violations.push(format!("missing required property '{field}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, prop_schema) in properties {
            let Some(value) = obj.get(key) else { continue };

            if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
                if !type_matches(value, expected) {
                    violations.push(format!(
                        "property '{key}' expected {expected}, got {}",
                        type_name(value)
                    ));
                }
            }

            if let Some(allowed) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                if !allowed.contains(value) {
                    violations.push(format!("property '{key}' is not one of the allowed values"));
                }
            }
        }
    }

    violations
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        // Unknown type keywords are not enforced.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer" },
                "mode": { "type": "string", "enum": ["fast", "thorough"] }
            },
            "required": ["query"]
        })
    }

    #[test]
    fn valid_arguments_pass() {
        let args = json!({"query": "rust", "limit": 5, "mode": "fast"});
        assert!(validate(&args, &schema()).is_empty());
    }

    #[test]
    fn missing_required_property() {
        let violations = validate(&json!({"limit": 5}), &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("query"));
    }

    #[test]
    fn wrong_property_type() {
        let violations = validate(&json!({"query": 7}), &schema());
        assert!(violations[0].contains("expected string"));
    }

    #[test]
    fn integer_rejects_float() {
        let violations = validate(&json!({"query": "x", "limit": 1.5}), &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("limit"));
    }

    #[test]
    fn enum_membership_enforced() {
        let violations = validate(&json!({"query": "x", "mode": "sloppy"}), &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("mode"));
    }

    #[test]
    fn non_object_arguments_rejected_for_object_schema() {
        let violations = validate(&json!("just text"), &schema());
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("expected an object"));
    }

    #[test]
    fn unconstrained_properties_pass() {
        let args = json!({"query": "x", "extra": {"anything": true}});
        assert!(validate(&args, &schema()).is_empty());
    }

    #[test]
    fn empty_schema_accepts_anything() {
        assert!(validate(&json!({"a": 1}), &json!({})).is_empty());
    }
}
