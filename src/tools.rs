//! Tool-claim extraction from untrusted AI response text.
//!
//! Capture records store the model's answer verbatim. When the model was
//! asked to recommend equipment, that text is (usually) a JSON document with
//! a `required_tools` array; sometimes it is prose, truncated JSON, or
//! already-decoded structure. [`parse_tool_claims`] accepts all of those and
//! always returns a [`ToolClaims`] whose status says which case applied:
//!
//! | Input | Status | Label |
//! |-------|--------|-------|
//! | null, `""`, `false`, `0` | `Absent` | `—` |
//! | text that is not JSON | `Error` | `Error` |
//! | JSON without a non-empty `required_tools` array | `None` | `None` |
//! | JSON with tools | `Present` | names joined with `, ` |
//!
//! Claims are derived on every read and never stored.

use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use tracing::warn;

/// Field holding the tool list, in either casing.
const TOOLS_FIELDS: [&str; 2] = ["required_tools", "requiredTools"];

/// Urgency bucket of a recommended tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Immediate,
    Soon,
    Optional,
    /// The default when the model gave no priority.
    Normal,
    /// Anything else, kept verbatim.
    Other(String),
}

impl Priority {
    /// Classify a free-text priority.
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "immediate" | "immediately" | "urgent" | "critical" | "high" | "now" => Priority::Immediate,
            "soon" | "medium" | "moderate" | "next" => Priority::Soon,
            "optional" | "low" | "nice to have" | "nice-to-have" => Priority::Optional,
            "normal" | "" => Priority::Normal,
            _ => Priority::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Priority::Immediate => "immediate",
            Priority::Soon => "soon",
            Priority::Optional => "optional",
            Priority::Normal => "normal",
            Priority::Other(s) => s,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recommended tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolClaim {
    pub name: String,
    pub purpose: String,
    pub priority: Priority,
}

/// Which of the four outcomes the parser reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClaimStatus {
    Absent,
    Error,
    None,
    Present,
}

/// Parser output: a status plus zero or more claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolClaims {
    pub status: ClaimStatus,
    pub claims: Vec<ToolClaim>,
}

impl ToolClaims {
    fn empty(status: ClaimStatus) -> Self {
        Self {
            status,
            claims: Vec::new(),
        }
    }

    /// One-line label for a table cell.
    pub fn summary_label(&self) -> Cow<'_, str> {
        match self.status {
            ClaimStatus::Absent => Cow::Borrowed("—"),
            ClaimStatus::Error => Cow::Borrowed("Error"),
            ClaimStatus::None => Cow::Borrowed("None"),
            ClaimStatus::Present => Cow::Owned(
                self.claims
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }
}

/// Extract tool claims from an AI response given as JSON text or as an
/// already-decoded value. Total: never panics, never returns an error.
///
/// A `Value::String` is parsed as JSON; any other value is used as-is.
pub fn parse_tool_claims(input: &Value) -> ToolClaims {
    if !is_truthy(input) {
        return ToolClaims::empty(ClaimStatus::Absent);
    }

    let parsed: Cow<'_, Value> = match input {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(v) => Cow::Owned(v),
            Err(e) => {
                warn!("Tool-claim parse error: {}", e);
                return ToolClaims::empty(ClaimStatus::Error);
            }
        },
        other => Cow::Borrowed(other),
    };

    let tools = match parsed.as_object().and_then(find_tools) {
        Some(tools) if !tools.is_empty() => tools,
        _ => return ToolClaims::empty(ClaimStatus::None),
    };

    let mut claims = Vec::with_capacity(tools.len());
    for entry in tools {
        match entry {
            Value::Null => {
                warn!("Tool-claim parse error: null entry in tool list");
                return ToolClaims::empty(ClaimStatus::Error);
            }
            Value::Object(fields) => claims.push(claim_from_fields(fields)),
            _ => claims.push(claim_from_fields(&Map::new())),
        }
    }

    ToolClaims {
        status: ClaimStatus::Present,
        claims,
    }
}

/// Convenience wrapper for raw response text.
pub fn parse_tool_claims_text(text: &str) -> ToolClaims {
    parse_tool_claims(&Value::String(text.to_string()))
}

fn find_tools(object: &Map<String, Value>) -> Option<&Vec<Value>> {
    TOOLS_FIELDS
        .iter()
        .find_map(|field| object.get(*field))
        .and_then(Value::as_array)
}

fn claim_from_fields(fields: &Map<String, Value>) -> ToolClaim {
    let name = first_text(fields, &["tool_name", "toolName", "name"]).unwrap_or("Unknown Tool");
    let purpose = first_text(fields, &["purpose"]).unwrap_or("No purpose");
    let priority = match fields.get("priority") {
        Some(Value::String(raw)) if !raw.is_empty() => Priority::classify(raw),
        Some(other) if is_truthy(other) => Priority::Other(other.to_string()),
        _ => Priority::Normal,
    };

    ToolClaim {
        name: name.to_string(),
        purpose: purpose.to_string(),
        priority,
    }
}

/// First non-empty string among `keys`.
fn first_text<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

/// Truthiness as the capture UI understood it: null, false, 0 and the
/// empty string mean "nothing here".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label(input: Value) -> String {
        parse_tool_claims(&input).summary_label().into_owned()
    }

    #[test]
    fn documented_labels() {
        assert_eq!(label(json!(null)), "—");
        assert_eq!(label(json!("")), "—");
        assert_eq!(label(json!("{not json")), "Error");
        assert_eq!(label(json!({})), "None");
        assert_eq!(label(json!({"required_tools": []})), "None");
        assert_eq!(label(json!({"required_tools": [{"tool_name": "Saw"}]})), "Saw");
    }

    #[test]
    fn text_and_object_inputs_agree() {
        let object = json!({"required_tools": [{"tool_name": "Saw"}, {"name": "Rope"}]});
        let text = Value::String(object.to_string());
        assert_eq!(parse_tool_claims(&object), parse_tool_claims(&text));
        assert_eq!(label(object), "Saw, Rope");
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let out = parse_tool_claims(&json!({"required_tools": [{"purpose": ""}]}));
        assert_eq!(out.status, ClaimStatus::Present);
        let claim = &out.claims[0];
        assert_eq!(claim.name, "Unknown Tool");
        assert_eq!(claim.purpose, "No purpose");
        assert_eq!(claim.priority, Priority::Normal);
    }

    #[test]
    fn priorities_are_classified() {
        let out = parse_tool_claims(&json!({"required_tools": [
            {"tool_name": "Chainsaw", "priority": "Immediate"},
            {"tool_name": "Gloves", "priority": "soon"},
            {"tool_name": "Ladder", "priority": "optional"},
            {"tool_name": "Tarp", "priority": "whenever"}
        ]}));
        let priorities: Vec<&str> = out.claims.iter().map(|c| c.priority.as_str()).collect();
        assert_eq!(priorities, vec!["immediate", "soon", "optional", "whenever"]);
    }

    #[test]
    fn non_text_priorities_are_kept() {
        let out = parse_tool_claims(&json!({"required_tools": [
            {"tool_name": "Rope", "priority": 2},
            {"tool_name": "Axe", "priority": true},
            {"tool_name": "Rake", "priority": 0},
            {"tool_name": "Hoe", "priority": null}
        ]}));
        let priorities: Vec<&Priority> = out.claims.iter().map(|c| &c.priority).collect();
        assert_eq!(
            priorities,
            vec![
                &Priority::Other("2".into()),
                &Priority::Other("true".into()),
                &Priority::Normal,
                &Priority::Normal,
            ]
        );
    }

    #[test]
    fn camel_cased_payload_is_understood() {
        assert_eq!(label(json!({"requiredTools": [{"toolName": "Trimmer"}]})), "Trimmer");
    }

    #[test]
    fn non_object_json_has_no_tools() {
        assert_eq!(label(json!("42")), "None");
        assert_eq!(label(json!("null")), "None");
        assert_eq!(label(json!("[1, 2]")), "None");
        assert_eq!(label(json!({"required_tools": "Saw"})), "None");
    }

    #[test]
    fn null_entry_is_an_error() {
        assert_eq!(label(json!({"required_tools": [null]})), "Error");
    }

    #[test]
    fn scalar_entries_get_defaults() {
        assert_eq!(label(json!({"required_tools": [5]})), "Unknown Tool");
    }

    #[test]
    fn falsy_values_are_absent() {
        assert_eq!(label(json!(false)), "—");
        assert_eq!(label(json!(0)), "—");
        assert_eq!(label(json!(true)), "None");
    }

    #[test]
    fn prose_is_an_error_not_a_panic() {
        let out = parse_tool_claims_text("You will need a sturdy saw and some rope.");
        assert_eq!(out.status, ClaimStatus::Error);
        assert!(out.claims.is_empty());
    }
}
