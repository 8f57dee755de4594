//! Marker-delimited block extraction.
//!
//! The policy asks the model to prefix structured output with a marker
//! (`TOOL_CALL`, `FINAL_SQL`). Accepted shapes:
//! - `MARKER: {...}`
//! - `MARKER {...}` / `MARKER{...}`
//! - `MARKER\n{...}` / `MARKER:\n{...}`

/// Marker preceding a tool call object
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL";

/// Marker preceding the final answer object
pub const FINAL_SQL_MARKER: &str = "FINAL_SQL";

/// Find the first `marker` that is followed (optionally via a colon) by `{`
/// and return the text starting at that brace.
pub fn extract_block<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }

    for (idx, _) in text.match_indices(marker) {
        let after = &text[idx + marker.len()..];
        let rest = after.trim_start();
        let rest = rest.strip_prefix(':').unwrap_or(rest).trim_start();
        if rest.starts_with('{') {
            return Some(rest);
        }
    }

    None
}

/// Whether the marker appears at all, regardless of what follows it.
pub fn has_marker(text: &str, marker: &str) -> bool {
    !marker.is_empty() && text.contains(marker)
}
