//! Agent State Machine Controller
//!
//! The transition table for one agent run:
//!
//! ```text
//! Start ──RunStarted──▶ AwaitingModel
//! AwaitingModel ──ToolCallDetected──▶ ToolDispatch ──ToolCompleted──▶ AwaitingModel
//! AwaitingModel ──PlainMessageDetected──▶ PlainMessage ──MessageRecorded──▶ AwaitingModel
//! AwaitingModel ──FinalAnswerDetected──▶ FinalAnswer ──AnswerAccepted──▶ Terminated(success)
//! AwaitingModel ──StepLimitReached──▶ Terminated(error)
//! any non-terminal ──Failed──▶ Terminated(error)
//! ```
//!
//! Every other pair is invalid; `Terminated` is absorbing.

use tracing::{debug, warn};

use crate::agentic_state::{AgentEvent, AgentPhase, Outcome};

/// Next phase for `(phase, event)`, or `None` if the pair is not in the table.
pub fn transition(phase: AgentPhase, event: AgentEvent) -> Option<AgentPhase> {
    use AgentEvent as E;
    use AgentPhase as P;

    let next = match (phase, event) {
        (P::Terminated { .. }, _) => return None,
        (_, E::Failed) => P::Terminated {
            outcome: Outcome::Error,
        },
        (P::Start, E::RunStarted) => P::AwaitingModel,
        (P::AwaitingModel, E::ToolCallDetected) => P::ToolDispatch,
        (P::AwaitingModel, E::FinalAnswerDetected) => P::FinalAnswer,
        (P::AwaitingModel, E::PlainMessageDetected) => P::PlainMessage,
        (P::AwaitingModel, E::StepLimitReached) => P::Terminated {
            outcome: Outcome::Error,
        },
        (P::ToolDispatch, E::ToolCompleted) => P::AwaitingModel,
        (P::PlainMessage, E::MessageRecorded) => P::AwaitingModel,
        (P::FinalAnswer, E::AnswerAccepted) => P::Terminated {
            outcome: Outcome::Success,
        },
        _ => return None,
    };
    Some(next)
}

/// Tracks the phase of one run and its history.
#[derive(Debug, Clone)]
pub struct AgentStateMachine {
    phase: AgentPhase,
    history: Vec<AgentPhase>,
}

impl AgentStateMachine {
    pub fn new() -> Self {
        Self {
            phase: AgentPhase::Start,
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Phases left behind, oldest first
    pub fn history(&self) -> &[AgentPhase] {
        &self.history
    }

    /// Apply an event. Invalid events leave the phase unchanged and return false.
    pub fn handle_event(&mut self, event: AgentEvent) -> bool {
        match transition(self.phase, event) {
            Some(next) => {
                self.history.push(self.phase);
                self.phase = next;
                debug!("Agent phase: {}", next.name());
                true
            }
            None => {
                warn!(
                    "Ignoring event {:?} in phase {}",
                    event,
                    self.phase.name()
                );
                false
            }
        }
    }
}

impl Default for AgentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
