//! Agent request command.

use serde::Serialize;

use crate::agentic_loop::run_agent;
use crate::app_state::AppContext;

/// Reminder attached to every generated statement
pub const PREVIEW_NOTICE: &str = "Review this SQL before execution.";

/// Reply shown to the operator for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChatResponse {
    Generated {
        generated_sql: String,
        explanation: String,
        preview: String,
    },
    Failed {
        error: String,
    },
}

/// Run the agent on `message`. The SQL is returned, never executed.
pub async fn chat(ctx: &AppContext, message: &str) -> ChatResponse {
    let message = message.trim();
    if message.is_empty() {
        return ChatResponse::Failed {
            error: "Empty request".to_string(),
        };
    }

    let run = run_agent(&ctx.agent, message).await;
    match run.outcome {
        Ok(answer) => ChatResponse::Generated {
            generated_sql: answer.sql,
            explanation: answer.explanation,
            preview: PREVIEW_NOTICE.to_string(),
        },
        Err(e) => ChatResponse::Failed {
            error: e.to_string(),
        },
    }
}
