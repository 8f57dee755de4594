//! Common utilities for turning parsed JSON into tool invocations.

use serde_json::{Map, Value};

use super::json_fixer::parse_json;
use crate::protocol::ToolInvocation;

/// Validate that a string looks like a tool name rather than prose.
fn looks_like_tool_name(name: &str) -> bool {
    !name.is_empty() && name.len() < 200 && !name.contains('\n')
}

/// Extract arguments from parsed JSON, supporting:
/// - `arguments` (standard)
/// - `parameters` (Llama format)
/// - `arguments` given as a JSON-encoded string
pub fn extract_tool_arguments_from_json(parsed: &Map<String, Value>) -> Map<String, Value> {
    let raw = parsed.get("arguments").or_else(|| parsed.get("parameters"));
    match raw {
        Some(Value::Object(args)) => args.clone(),
        Some(Value::String(encoded)) => parse_json(encoded).unwrap_or_default(),
        _ => Map::new(),
    }
}

/// Build a tool invocation from a parsed object with a string `name`.
pub fn tool_invocation_from_json(parsed: &Map<String, Value>) -> Option<ToolInvocation> {
    let name = parsed.get("name")?.as_str()?.trim();
    if !looks_like_tool_name(name) {
        return None;
    }
    Some(ToolInvocation::new(
        name,
        extract_tool_arguments_from_json(parsed),
    ))
}

/// Parse a tool invocation out of a (possibly noisy) block of text.
pub fn parse_tool_invocation(text: &str) -> Option<ToolInvocation> {
    let parsed = parse_json(text)?;
    tool_invocation_from_json(&parsed)
}

/// Whether a parsed object has the implicit tool call shape:
/// `name` and `arguments` present, no `sql` key.
pub fn is_implicit_tool_call(parsed: &Map<String, Value>) -> bool {
    parsed.contains_key("name") && parsed.contains_key("arguments") && !parsed.contains_key("sql")
}
