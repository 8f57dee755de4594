//! Agentic State - phases, events, errors and per-run conversation state.
//!
//! A run moves through `AgentPhase`s driven by `AgentEvent`s (see
//! `state_machine::transition`). `ConversationState` is created per run and
//! discarded when the run ends; the metadata cache and the connection are
//! shared and live elsewhere.

use serde::Serialize;
use thiserror::Error;

use crate::llm_runtime::LlmError;
use crate::protocol::{ConversationTurn, FinalAnswer, Role, ToolInvocation};
use crate::repetition_detector::ToolCallRepetitionDetector;

// ============ Phases ============

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
}

/// Where the agent loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AgentPhase {
    Start,
    /// Prompt sent, waiting for model text
    AwaitingModel,
    /// Model asked for a tool
    ToolDispatch,
    /// Model produced a final-answer block
    FinalAnswer,
    /// Model text with no actionable block
    PlainMessage,
    Terminated { outcome: Outcome },
}

impl AgentPhase {
    pub fn name(&self) -> &'static str {
        match self {
            AgentPhase::Start => "Start",
            AgentPhase::AwaitingModel => "Awaiting Model",
            AgentPhase::ToolDispatch => "Tool Dispatch",
            AgentPhase::FinalAnswer => "Final Answer",
            AgentPhase::PlainMessage => "Plain Message",
            AgentPhase::Terminated {
                outcome: Outcome::Success,
            } => "Terminated (success)",
            AgentPhase::Terminated {
                outcome: Outcome::Error,
            } => "Terminated (error)",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentPhase::Terminated { .. })
    }
}

// ============ Events ============

/// Events that drive phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent {
    RunStarted,
    /// Model text contained a tool call
    ToolCallDetected,
    /// Model text contained a final answer block or implicit answer object
    FinalAnswerDetected,
    /// Model text had nothing actionable
    PlainMessageDetected,
    /// Tool result appended as a tool turn
    ToolCompleted,
    /// Plain text appended as an assistant turn
    MessageRecorded,
    /// Final answer parsed
    AnswerAccepted,
    /// Step budget spent without a terminal state
    StepLimitReached,
    /// Any fatal error
    Failed,
}

// ============ Errors ============

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("No active database connection")]
    NoActiveConnection,
    #[error("Invalid FINAL_SQL JSON")]
    InvalidFinalAnswer,
    #[error("Stuck in a loop: {tool} requested {repeats} times in a row with the same arguments")]
    StuckLoop { tool: String, repeats: usize },
    #[error("Reached max_steps ({max_steps}) without a final answer")]
    MaxStepsReached { max_steps: usize },
    #[error("LLM did not answer within {timeout_secs}s")]
    LlmTimeout { timeout_secs: u64 },
    #[error("LLM failed: {0}")]
    LlmFailure(String),
}

impl AgentError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::NoActiveConnection => "no_active_connection",
            AgentError::InvalidFinalAnswer => "invalid_final_answer",
            AgentError::StuckLoop { .. } => "stuck_loop",
            AgentError::MaxStepsReached { .. } => "max_steps_reached",
            AgentError::LlmTimeout { .. } => "llm_timeout",
            AgentError::LlmFailure(_) => "llm_failure",
        }
    }
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout { timeout, .. } => AgentError::LlmTimeout {
                timeout_secs: timeout.as_secs(),
            },
            other => AgentError::LlmFailure(other.to_string()),
        }
    }
}

/// Serialized reply of a run: `{sql, explanation}` or `{error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AgentReply {
    Answer { sql: String, explanation: String },
    Error { error: String },
}

impl From<&Result<FinalAnswer, AgentError>> for AgentReply {
    fn from(outcome: &Result<FinalAnswer, AgentError>) -> Self {
        match outcome {
            Ok(answer) => AgentReply::Answer {
                sql: answer.sql.clone(),
                explanation: answer.explanation.clone(),
            },
            Err(e) => AgentReply::Error {
                error: e.to_string(),
            },
        }
    }
}

// ============ Conversation State ============

/// Per-run conversation and bookkeeping.
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
    steps: usize,
    max_steps: usize,
    selected_schema: Option<String>,
    repetition: ToolCallRepetitionDetector,
}

impl ConversationState {
    pub fn new(max_steps: usize, stuck_loop_threshold: usize) -> Self {
        Self {
            turns: Vec::new(),
            steps: 0,
            max_steps,
            selected_schema: None,
            repetition: ToolCallRepetitionDetector::new(stuck_loop_threshold),
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `window` turns, oldest first
    pub fn recent_turns(&self, window: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn tool_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::Tool).count()
    }

    /// Count one model invocation. Returns the new step number.
    pub fn begin_step(&mut self) -> usize {
        self.steps += 1;
        self.steps
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn steps_exhausted(&self) -> bool {
        self.steps >= self.max_steps
    }

    pub fn selected_schema(&self) -> Option<&str> {
        self.selected_schema.as_deref()
    }

    /// Select a schema for auto-fill. Only the first selection sticks.
    pub fn select_schema(&mut self, schema: &str) -> bool {
        if self.selected_schema.is_some() {
            return false;
        }
        self.selected_schema = Some(schema.to_string());
        true
    }

    /// Record a tool request; returns how many times in a row it was made.
    pub fn record_tool_call(&mut self, invocation: &ToolInvocation) -> usize {
        self.repetition.record(invocation)
    }

    pub fn is_stuck(&self, consecutive: usize) -> bool {
        self.repetition.is_stuck(consecutive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_phase_names_and_terminal() {
        assert_eq!(AgentPhase::AwaitingModel.name(), "Awaiting Model");
        assert!(!AgentPhase::ToolDispatch.is_terminal());
        assert!(AgentPhase::Terminated {
            outcome: Outcome::Error
        }
        .is_terminal());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AgentError::NoActiveConnection.code(), "no_active_connection");
        assert_eq!(
            AgentError::MaxStepsReached { max_steps: 10 }.code(),
            "max_steps_reached"
        );
        assert_eq!(
            AgentError::StuckLoop {
                tool: "list_tables".to_string(),
                repeats: 4
            }
            .code(),
            "stuck_loop"
        );
    }

    #[test]
    fn test_llm_error_mapping() {
        let timeout = LlmError::Timeout {
            model: "m".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert!(matches!(
            AgentError::from(timeout),
            AgentError::LlmTimeout { timeout_secs: 60 }
        ));

        let failed = LlmError::ProcessFailed {
            status: "exit status: 1".to_string(),
            output: "model not found".to_string(),
        };
        assert!(matches!(AgentError::from(failed), AgentError::LlmFailure(_)));
    }

    #[test]
    fn test_reply_serialization() {
        let ok: Result<FinalAnswer, AgentError> = Ok(FinalAnswer {
            sql: "SELECT 1".to_string(),
            explanation: "one".to_string(),
        });
        assert_eq!(
            serde_json::to_value(AgentReply::from(&ok)).unwrap(),
            json!({"sql": "SELECT 1", "explanation": "one"})
        );

        let err: Result<FinalAnswer, AgentError> = Err(AgentError::InvalidFinalAnswer);
        assert_eq!(
            serde_json::to_value(AgentReply::from(&err)).unwrap(),
            json!({"error": "Invalid FINAL_SQL JSON"})
        );
    }

    #[test]
    fn test_steps_are_monotonic_and_bounded() {
        let mut state = ConversationState::new(2, 3);
        assert_eq!(state.begin_step(), 1);
        assert!(!state.steps_exhausted());
        assert_eq!(state.begin_step(), 2);
        assert!(state.steps_exhausted());
    }

    #[test]
    fn test_schema_selection_sticks() {
        let mut state = ConversationState::new(10, 3);
        assert!(state.select_schema("public"));
        assert!(!state.select_schema("sales"));
        assert_eq!(state.selected_schema(), Some("public"));
    }

    #[test]
    fn test_recent_turns_window() {
        let mut state = ConversationState::new(10, 3);
        state.push(ConversationTurn::user("q"));
        state.push(ConversationTurn::assistant("a"));
        state.push(ConversationTurn::tool("{}"));
        assert_eq!(state.recent_turns(2).len(), 2);
        assert_eq!(state.recent_turns(2)[0].role, Role::Assistant);
        assert_eq!(state.recent_turns(10).len(), 3);
        assert_eq!(state.tool_turn_count(), 1);
    }
}
