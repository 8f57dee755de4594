//! Terminal noise removal for raw model output.
//!
//! Local runtimes driven through a CLI leak spinner frames, cursor control
//! sequences and bracketed-paste toggles into stdout. Models also like to wrap
//! JSON in markdown fences even when told not to.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// CSI sequences (`ESC [ ... letter`), including private modes like `ESC[?25l`
    static ref ANSI_CSI_RE: Regex = Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap();
    /// OSC sequences (`ESC ] ... BEL`), used by some terminals for titles
    static ref ANSI_OSC_RE: Regex = Regex::new(r"\x1b\][^\x07]*\x07").unwrap();
    /// Fragments left behind when the escape byte itself was already stripped
    static ref ORPHAN_CONTROL_RE: Regex = Regex::new(r"\[\?(?:2004|25)[hl]|\[2K|\[1G").unwrap();
    /// Braille spinner frames
    static ref SPINNER_RE: Regex = Regex::new(r"[⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏]").unwrap();
    /// Markdown code fences with an optional language tag
    static ref FENCE_RE: Regex = Regex::new(r"```[A-Za-z0-9_-]*").unwrap();
}

/// Remove everything from a fragment that is fence markup, nothing else.
pub fn strip_code_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").into_owned()
}

fn clean_once(text: &str) -> String {
    let text = ANSI_CSI_RE.replace_all(text, "");
    let text = ANSI_OSC_RE.replace_all(&text, "");
    let text = ORPHAN_CONTROL_RE.replace_all(&text, "");
    let text = SPINNER_RE.replace_all(&text, "");
    let text = FENCE_RE.replace_all(&text, "");
    text.replace('\x1b', "").trim().to_string()
}

/// Strip control sequences, spinner glyphs and code fences from model output.
///
/// Idempotent: removing one sequence can splice the halves of another back
/// together, so passes repeat until the text stops changing.
pub fn clean(text: &str) -> String {
    let mut current = clean_once(text);
    loop {
        let next = clean_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_ansi_and_spinners() {
        let raw = "\x1b[?25l⠋ ⠙ \x1b[2K\x1b[1GTOOL_CALL: {\"name\": \"list_schemas\"}\x1b[?25h";
        assert_eq!(clean(raw), "TOOL_CALL: {\"name\": \"list_schemas\"}");
    }

    #[test]
    fn test_clean_removes_orphaned_paste_toggles() {
        let raw = "[?2004hFINAL_SQL: {}[?2004l";
        assert_eq!(clean(raw), "FINAL_SQL: {}");
    }

    #[test]
    fn test_clean_strips_fences() {
        let raw = "```json\n{\"sql\": \"SELECT 1\"}\n```";
        assert_eq!(clean(raw), "{\"sql\": \"SELECT 1\"}");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let samples = [
            "\x1b[\x1b[2K2Kplain",
            "⠹ thinking... ```sql\nSELECT 1\n```",
            "  already clean  ",
            "\x1b]0;title\x07text",
        ];
        for sample in samples {
            let once = clean(sample);
            assert_eq!(clean(&once), once, "not idempotent for {:?}", sample);
        }
    }
}
