//! Agentic loop execution for SQL generation.
//!
//! The loop repeatedly prompts the model, detects what it asked for, runs
//! introspection tools, and stops on a final answer or a fatal error.
//!
//! ## Key Types
//! - `AgentContext` - Shared collaborators and per-run limits
//! - `AgentAction` - Result of action detection on one model reply
//! - `AgentRun` - Outcome plus the conversation that produced it
//!
//! ## Key Functions
//! - `run_agent()` - Main loop execution
//! - `detect_agent_action()` - Classify a sanitized model reply

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agentic_state::{AgentError, AgentEvent, AgentPhase, AgentReply, ConversationState};
use crate::llm_runtime::SharedLlmRuntime;
use crate::protocol::{ConversationTurn, FinalAnswer, ToolInvocation, ToolResult};
use crate::settings::AgentSettings;
use crate::state_machine::AgentStateMachine;
use crate::system_prompt::{build_prompt, POLICY};
use crate::tool_execution::{is_schema_unset, SqlTool, ToolDispatcher};
use crate::tool_parsing::{
    clean, extract_block, has_marker, is_implicit_tool_call, parse_final_answer, parse_json,
    parse_tool_invocation, tool_invocation_from_json, FINAL_SQL_MARKER, TOOL_CALL_MARKER,
};
use crate::tool_registry::SharedToolCatalog;
use crate::tools::truncate_for_log;

const LOG_PREVIEW_CHARS: usize = 200;

// ============================================================================
// Types
// ============================================================================

/// What the model asked for in one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    ToolCall(ToolInvocation),
    /// `None` when the answer block was present but unusable
    FinalAnswer(Option<FinalAnswer>),
    /// Nothing actionable. `invalid_tool_json` marks a `TOOL_CALL` marker
    /// whose object could not be parsed.
    Plain { invalid_tool_json: bool },
}

/// Limits and switches for one run, taken from `AgentSettings`.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub stuck_loop_threshold: usize,
    pub history_window: usize,
    pub accept_bare_final_answer: bool,
    pub policy: String,
}

impl AgentConfig {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            stuck_loop_threshold: settings.stuck_loop_threshold,
            history_window: settings.history_window,
            accept_bare_final_answer: settings.accept_bare_final_answer,
            policy: settings
                .policy_prompt
                .clone()
                .unwrap_or_else(|| POLICY.to_string()),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_settings(&AgentSettings::default())
    }
}

/// Everything a run needs. Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct AgentContext {
    pub llm: SharedLlmRuntime,
    pub catalog: SharedToolCatalog,
    pub dispatcher: Arc<ToolDispatcher>,
    pub config: AgentConfig,
}

/// Result of one run.
#[derive(Debug)]
pub struct AgentRun {
    pub run_id: Uuid,
    pub outcome: Result<FinalAnswer, AgentError>,
    pub conversation: ConversationState,
    pub phase: AgentPhase,
}

impl AgentRun {
    pub fn reply(&self) -> AgentReply {
        AgentReply::from(&self.outcome)
    }
}

// ============================================================================
// Action detection
// ============================================================================

/// Fallback for a bare `{"sql": ...}` object: a string `sql` is enough,
/// the explanation defaults to empty.
fn bare_final_answer(text: &str, parsed: &serde_json::Map<String, Value>) -> Option<FinalAnswer> {
    if let Some(answer) = parse_final_answer(text) {
        return Some(answer);
    }
    let sql = parsed.get("sql")?.as_str()?;
    let explanation = parsed
        .get("explanation")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Some(FinalAnswer {
        sql: sql.to_string(),
        explanation: explanation.to_string(),
    })
}

/// Classify a sanitized model reply.
///
/// Precedence: `TOOL_CALL` block, `FINAL_SQL` block, implicit tool call
/// object, implicit answer object (only when `accept_bare` is set).
pub fn detect_agent_action(cleaned: &str, accept_bare: bool) -> AgentAction {
    let mut invalid_tool_json = false;

    if has_marker(cleaned, TOOL_CALL_MARKER) {
        match extract_block(cleaned, TOOL_CALL_MARKER).and_then(parse_tool_invocation) {
            Some(invocation) => return AgentAction::ToolCall(invocation),
            None => invalid_tool_json = true,
        }
    }

    if has_marker(cleaned, FINAL_SQL_MARKER) {
        let answer = extract_block(cleaned, FINAL_SQL_MARKER).and_then(parse_final_answer);
        return AgentAction::FinalAnswer(answer);
    }

    if !invalid_tool_json {
        if let Some(parsed) = parse_json(cleaned) {
            if is_implicit_tool_call(&parsed) {
                if let Some(invocation) = tool_invocation_from_json(&parsed) {
                    return AgentAction::ToolCall(invocation);
                }
            } else if accept_bare && parsed.contains_key("sql") {
                return AgentAction::FinalAnswer(bare_final_answer(cleaned, &parsed));
            }
        }
    }

    AgentAction::Plain { invalid_tool_json }
}

// ============================================================================
// Loop
// ============================================================================

/// Pick the session schema when `list_schemas` returned exactly one.
fn maybe_select_schema(state: &mut ConversationState, result: &ToolResult) {
    if let ToolResult::Payload(Value::Array(items)) = result {
        if let [Value::String(only)] = items.as_slice() {
            if state.select_schema(only) {
                info!("Auto-selected schema '{}'", only);
            }
        }
    }
}

async fn handle_tool_call(
    ctx: &AgentContext,
    state: &mut ConversationState,
    mut invocation: ToolInvocation,
) -> Result<(), AgentError> {
    invocation.normalize();
    let tool = SqlTool::from_name(&invocation.name);

    if tool.requires_schema() && is_schema_unset(invocation.arguments.get("schema")) {
        if let Some(schema) = state.selected_schema().map(str::to_string) {
            debug!("Filling schema '{}' for {}", schema, tool.name());
            invocation
                .arguments
                .insert("schema".to_string(), Value::String(schema));
        }
    }

    let repeats = state.record_tool_call(&invocation);
    if state.is_stuck(repeats) {
        warn!(
            "Tool {} requested {} times in a row, stopping",
            invocation.name, repeats
        );
        return Err(AgentError::StuckLoop {
            tool: invocation.name,
            repeats,
        });
    }

    let result = ctx.dispatcher.execute(&invocation).await?;
    if tool == SqlTool::ListSchemas {
        maybe_select_schema(state, &result);
    }

    let rendered = result.to_json().to_string();
    info!(
        tool = tool.name(),
        is_error = result.is_error(),
        "Tool result: {}",
        truncate_for_log(&rendered, LOG_PREVIEW_CHARS)
    );
    state.push(ConversationTurn::tool(rendered));
    Ok(())
}

async fn drive(
    ctx: &AgentContext,
    user_input: &str,
    state: &mut ConversationState,
    machine: &mut AgentStateMachine,
) -> Result<FinalAnswer, AgentError> {
    let config = &ctx.config;

    loop {
        if state.steps_exhausted() {
            return Err(AgentError::MaxStepsReached {
                max_steps: state.max_steps(),
            });
        }
        let step = state.begin_step();

        let prompt = build_prompt(
            &config.policy,
            &ctx.catalog,
            state,
            config.history_window,
            user_input,
        );
        debug!(step, prompt_chars = prompt.len(), model = ctx.llm.model(), "Invoking model");

        let raw = ctx.llm.run_text(&prompt).await?;
        let cleaned = clean(&raw);
        debug!(step, "Model replied: {}", truncate_for_log(&cleaned, LOG_PREVIEW_CHARS));

        match detect_agent_action(&cleaned, config.accept_bare_final_answer) {
            AgentAction::ToolCall(invocation) => {
                machine.handle_event(AgentEvent::ToolCallDetected);
                state.push(ConversationTurn::assistant(cleaned.clone()));
                handle_tool_call(ctx, state, invocation).await?;
                machine.handle_event(AgentEvent::ToolCompleted);
            }
            AgentAction::FinalAnswer(parsed) => {
                machine.handle_event(AgentEvent::FinalAnswerDetected);
                let answer = parsed.ok_or(AgentError::InvalidFinalAnswer)?;
                machine.handle_event(AgentEvent::AnswerAccepted);
                return Ok(answer);
            }
            AgentAction::Plain { invalid_tool_json } => {
                if invalid_tool_json {
                    warn!("Unparseable TOOL_CALL block, keeping it as a message");
                }
                machine.handle_event(AgentEvent::PlainMessageDetected);
                state.push(ConversationTurn::assistant(cleaned));
                machine.handle_event(AgentEvent::MessageRecorded);
            }
        }
    }
}

/// Run the agent on one user request.
pub async fn run_agent(ctx: &AgentContext, user_input: &str) -> AgentRun {
    let run_id = Uuid::new_v4();
    let span = info_span!("agent_run", run_id = %run_id);

    async move {
        let mut state =
            ConversationState::new(ctx.config.max_steps, ctx.config.stuck_loop_threshold);
        let mut machine = AgentStateMachine::new();
        machine.handle_event(AgentEvent::RunStarted);
        info!("Agent run started: {}", truncate_for_log(user_input, LOG_PREVIEW_CHARS));

        let outcome = drive(ctx, user_input, &mut state, &mut machine).await;

        match &outcome {
            Ok(answer) => info!(
                steps = state.steps(),
                "Final SQL: {}",
                truncate_for_log(&answer.sql, LOG_PREVIEW_CHARS)
            ),
            Err(e) => {
                let event = match e {
                    AgentError::MaxStepsReached { .. } => AgentEvent::StepLimitReached,
                    _ => AgentEvent::Failed,
                };
                machine.handle_event(event);
                warn!(steps = state.steps(), code = e.code(), "Agent run failed: {}", e);
            }
        }
        let phases: Vec<&str> = machine.history().iter().map(|p| p.name()).collect();
        debug!(phases = ?phases, final_phase = machine.phase().name(), "Agent run finished");

        AgentRun {
            run_id,
            outcome,
            phase: machine.phase(),
            conversation: state,
        }
    }
    .instrument(span)
    .await
}
