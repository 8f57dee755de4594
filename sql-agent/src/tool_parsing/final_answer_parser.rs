//! Final answer (`{"sql": ..., "explanation": ...}`) parsing.
//!
//! Models writing long queries often break the `sql` value into a chain of
//! string concatenations (`"SELECT *" + " FROM orders"`), which is not JSON.
//! When strict parsing fails, the literal fragments are joined back together.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::json_fixer::parse_json;
use super::output_cleaner::strip_code_fences;
use crate::protocol::FinalAnswer;

lazy_static! {
    static ref SQL_CONCAT_RE: Regex =
        Regex::new(r#"(?s)"sql"\s*:\s*((?:"(?:[^"\\]|\\.)*"\s*\+\s*)*"(?:[^"\\]|\\.)*")"#).unwrap();
    static ref STRING_LITERAL_RE: Regex = Regex::new(r#"(?s)"((?:[^"\\]|\\.)*)""#).unwrap();
    static ref EXPLANATION_RE: Regex =
        Regex::new(r#"(?s)"explanation"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap();
}

/// Decode JSON escapes in a string literal body, keeping it raw when the body
/// is not valid JSON (e.g. contains a literal newline).
fn unescape_fragment(body: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", body)).unwrap_or_else(|_| body.to_string())
}

fn from_concatenation(text: &str) -> Option<FinalAnswer> {
    let text = strip_code_fences(text);

    let sql_group = SQL_CONCAT_RE.captures(&text)?.get(1)?.as_str();
    let sql: String = STRING_LITERAL_RE
        .captures_iter(sql_group)
        .filter_map(|cap| cap.get(1))
        .map(|m| unescape_fragment(m.as_str()))
        .collect();

    let explanation = EXPLANATION_RE
        .captures(&text)?
        .get(1)
        .map(|m| unescape_fragment(m.as_str()))?;

    Some(FinalAnswer { sql, explanation })
}

/// Parse a final answer. Both `sql` and `explanation` must be recoverable.
pub fn parse_final_answer(text: &str) -> Option<FinalAnswer> {
    if let Some(map) = parse_json(text) {
        if let (Some(Value::String(sql)), Some(Value::String(explanation))) =
            (map.get("sql"), map.get("explanation"))
        {
            return Some(FinalAnswer {
                sql: sql.clone(),
                explanation: explanation.clone(),
            });
        }
    }

    from_concatenation(text)
}
