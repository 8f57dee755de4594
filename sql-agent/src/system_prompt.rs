//! System prompt construction for the SQL agent.
//!
//! The prompt is rebuilt from scratch for every model invocation. Building is
//! a pure function of its inputs: the same policy, catalog, conversation and
//! request always produce the same text.

use crate::agentic_state::ConversationState;
use crate::protocol::{ConversationTurn, Role, ToolSchema};
use crate::tool_registry::ToolCatalog;

// ============ Policy ============

/// Default policy given to the model. Can be replaced through settings.
pub const POLICY: &str = "\
You are a SQL generation agent. You write a single SQL statement that answers \
the user's request, using only database metadata you have looked up with tools.

RULES:
1. Reply with exactly one block per message, either a TOOL_CALL block or a FINAL_SQL block.
2. TOOL_CALL format: TOOL_CALL: {\"name\": \"<tool>\", \"arguments\": {...}}
3. FINAL_SQL format: FINAL_SQL: {\"sql\": \"<statement>\", \"explanation\": \"<short reason>\"}
4. Never invent schemas, tables or columns. Look them up first:
   list_schemas, then list_tables, then get_columns or describe_table.
5. Call get_foreign_keys before writing a JOIN.
6. Never execute SQL yourself. The user reviews the statement before running it.
7. If the metadata you found cannot answer the request, reply with
   FINAL_SQL: {\"sql\": \"\", \"explanation\": \"Insufficient metadata to generate SQL.\"}
8. Do not use markdown or backticks. Stop after the FINAL_SQL block.";

/// Closing line appended after the user request.
pub const CLOSING_INSTRUCTION: &str =
    "Follow the rules above strictly. Respond ONLY with a TOOL_CALL or FINAL_SQL JSON block.";

// ============ Sections ============

/// Render the catalog in declaration order, one tool per paragraph.
pub fn format_tool_catalog(tools: &[ToolSchema]) -> String {
    if tools.is_empty() {
        return "(no tools available)".to_string();
    }

    tools
        .iter()
        .map(|tool| {
            let desc = tool.description.as_deref().unwrap_or("No description");
            format!(
                "- {}: {}\n  parameters: {}",
                tool.name, desc, tool.parameters
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_turn(turn: &ConversationTurn) -> String {
    let label = match turn.role {
        Role::User => "USER",
        Role::Assistant => "ASSISTANT",
        Role::Tool => "TOOL_RESULT",
    };
    format!("{}: {}", label, turn.content)
}

/// Render the last `window` turns, oldest first.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "(empty)".to_string();
    }
    turns.iter().map(format_turn).collect::<Vec<_>>().join("\n")
}

// ============ Builder ============

/// Assemble the full prompt for one step.
pub fn build_prompt(
    policy: &str,
    catalog: &ToolCatalog,
    state: &ConversationState,
    history_window: usize,
    user_input: &str,
) -> String {
    let mut sections = Vec::with_capacity(6);

    sections.push(format!("### POLICY\n{}", policy.trim()));
    sections.push(format!(
        "### AVAILABLE_TOOLS\n{}",
        format_tool_catalog(catalog.tools())
    ));
    sections.push(format!(
        "### CONVERSATION_HISTORY\n{}",
        format_history(state.recent_turns(history_window))
    ));

    if let Some(schema) = state.selected_schema() {
        sections.push(format!(
            "### CONTEXT\nSelected schema: {}. Tools that need a schema use it when none is given.",
            schema
        ));
    }

    sections.push(format!("### USER_INPUT\n{}", user_input.trim()));
    sections.push(format!("### INSTRUCTION\n{}", CLOSING_INSTRUCTION));

    sections.join("\n\n")
}
