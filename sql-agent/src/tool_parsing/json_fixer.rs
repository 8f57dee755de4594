//! JSON repair utilities for handling malformed LLM output.
//!
//! LLMs often produce JSON with common issues:
//! - Markdown fences around the object
//! - `//` comments
//! - Trailing commas
//! - Unquoted keys or single-quoted strings
//! - Prose before and after the object
//!
//! Repair list, applied in order and retried after each step:
//! 1. strip trailing commas before `}` / `]`
//! 2. json5 decoding (unquoted keys, single quotes)

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::output_cleaner::strip_code_fences;

lazy_static! {
    static ref TRAILING_COMMA_RE: Regex = Regex::new(r",(\s*[}\]])").unwrap();
}

/// Remove `// ...` comments that start outside of string literals.
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '/' && chars.peek() == Some(&'/') {
            // Drop everything up to (not including) the newline
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }

        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }

    out
}

/// Remove trailing commas before a closing brace or bracket.
pub fn repair_trailing_commas(json_str: &str) -> String {
    TRAILING_COMMA_RE.replace_all(json_str, "$1").into_owned()
}

/// Find the first balanced top-level `{...}` in `text`.
///
/// Braces inside string literals do not count toward depth.
pub fn find_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

fn decode_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn decode_object_json5(raw: &str) -> Option<Map<String, Value>> {
    match json5::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parse the first JSON object found in free-form model text.
///
/// Returns `None` when no object can be recovered.
pub fn parse_json(text: &str) -> Option<Map<String, Value>> {
    let text = strip_line_comments(&strip_code_fences(text));

    // Unbalanced output (truncated generation) falls back to the widest slice
    let candidate = match find_first_json_object(&text) {
        Some(obj) => obj.to_string(),
        None => {
            let start = text.find('{')?;
            let end = text.rfind('}')?;
            if end <= start {
                return None;
            }
            text[start..=end].to_string()
        }
    };

    if let Some(map) = decode_object(&candidate) {
        return Some(map);
    }

    let repaired = repair_trailing_commas(&candidate);
    if let Some(map) = decode_object(&repaired) {
        return Some(map);
    }

    decode_object_json5(&repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_trailing_comma() {
        let parsed = parse_json(r#"{"sql":"SELECT 1",}"#).unwrap();
        assert_eq!(Value::Object(parsed), json!({"sql": "SELECT 1"}));
    }

    #[test]
    fn test_parse_json_nested_trailing_comma_in_array() {
        let parsed = parse_json(r#"{"columns": ["a", "b",], "n": 1,}"#).unwrap();
        assert_eq!(parsed["columns"], json!(["a", "b"]));
    }

    #[test]
    fn test_parse_json_braces_inside_strings() {
        let text = r#"Here: {"sql": "SELECT '}' AS brace", "explanation": "uses {braces}"} trailing {junk}"#;
        let parsed = parse_json(text).unwrap();
        assert_eq!(parsed["sql"], json!("SELECT '}' AS brace"));
        assert_eq!(parsed["explanation"], json!("uses {braces}"));
    }

    #[test]
    fn test_parse_json_nested_object_takes_outer() {
        let text = r#"{"name": "list_tables", "arguments": {"schema": "public"}} and {"other": 1}"#;
        let parsed = parse_json(text).unwrap();
        assert_eq!(parsed["arguments"]["schema"], json!("public"));
    }

    #[test]
    fn test_parse_json_strips_comments_outside_strings() {
        let text = "{\n  // the table\n  \"url\": \"http://example.com\"\n}";
        let parsed = parse_json(text).unwrap();
        assert_eq!(parsed["url"], json!("http://example.com"));
    }

    #[test]
    fn test_parse_json_fenced() {
        let parsed = parse_json("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(parsed["a"], json!(1));
    }

    #[test]
    fn test_parse_json_unquoted_keys_via_json5() {
        let parsed = parse_json("{name: 'list_schemas', arguments: {}}").unwrap();
        assert_eq!(parsed["name"], json!("list_schemas"));
    }

    #[test]
    fn test_parse_json_garbage() {
        assert!(parse_json("no json here").is_none());
        assert!(parse_json("} backwards {").is_none());
        assert!(parse_json("{\"sql\": }").is_none());
    }

    #[test]
    fn test_find_first_json_object_escaped_quote() {
        let text = r#"{"a": "say \"}\" please"} tail"#;
        assert_eq!(find_first_json_object(text), Some(r#"{"a": "say \"}\" please"}"#));
    }
}
