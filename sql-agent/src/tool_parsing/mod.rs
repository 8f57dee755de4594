//! Tool Parsing Module
//!
//! Turns raw, free-form model output into structured commands. Everything that
//! reads model text goes through here; callers never regex model output
//! themselves.
//!
//! Accepted shapes:
//! - `TOOL_CALL: {"name": ..., "arguments": {...}}` (colon optional)
//! - `FINAL_SQL: {"sql": ..., "explanation": ...}` (colon optional)
//! - a bare object embedded in prose (implicit tool call or implicit answer)
//!
//! ## Module Structure
//! - `output_cleaner`: ANSI/spinner/fence removal
//! - `block_extractor`: marker-delimited block lookup
//! - `json_fixer`: balanced-object scan and JSON repair
//! - `final_answer_parser`: `{sql, explanation}` with concatenation recovery
//! - `common`: tool invocation extraction

pub mod block_extractor;
pub mod common;
pub mod final_answer_parser;
pub mod json_fixer;
pub mod output_cleaner;

pub use block_extractor::{extract_block, has_marker, FINAL_SQL_MARKER, TOOL_CALL_MARKER};
pub use common::{is_implicit_tool_call, parse_tool_invocation, tool_invocation_from_json};
pub use final_answer_parser::parse_final_answer;
pub use json_fixer::parse_json;
pub use output_cleaner::clean;
