//! Operator shell commands.
//!
//! This module organizes the shell commands by domain:
//! - `chat`: run the agent on a natural-language request
//! - `database`: connect, disconnect, execute and inspect
//! - `cache`: metadata cache status and invalidation
//!
//! A line starting with `:` is a command; anything else is a request for
//! the agent.

pub mod cache;
pub mod chat;
pub mod database;

pub use cache::*;
pub use chat::*;
pub use database::*;

use serde_json::{json, Value};

use crate::app_state::AppContext;

pub const HELP_TEXT: &str = "\
Type a question to generate SQL, or one of:
  :connect <path> [name=path ...]  open a SQLite database (with attachments)
  :disconnect                      close the active connection
  :exec <sql>                      run a statement yourself
  :schema [schema]                 show table metadata
  :cache                           show metadata cache entries
  :invalidate [schema[.table]]     drop cache entries (all when no target)
  :help                            show this text
  :quit                            exit";

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Ask(String),
    Connect(Vec<String>),
    Disconnect,
    Exec(String),
    Schema(Option<String>),
    CacheStatus,
    Invalidate(Option<String>),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ShellCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ShellCommand::Empty;
        }
        let Some(command) = line.strip_prefix(':') else {
            return ShellCommand::Ask(line.to_string());
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        let optional = || (!rest.is_empty()).then(|| rest.to_string());

        match name {
            "connect" => ShellCommand::Connect(rest.split_whitespace().map(str::to_string).collect()),
            "disconnect" => ShellCommand::Disconnect,
            "exec" => ShellCommand::Exec(rest.to_string()),
            "schema" => ShellCommand::Schema(optional()),
            "cache" => ShellCommand::CacheStatus,
            "invalidate" => ShellCommand::Invalidate(optional()),
            "help" | "h" | "?" => ShellCommand::Help,
            "quit" | "q" | "exit" => ShellCommand::Quit,
            other => ShellCommand::Unknown(other.to_string()),
        }
    }
}

/// What the shell should do after a line.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellOutcome {
    Print(Value),
    Text(String),
    Nothing,
    Quit,
}

fn to_outcome(result: Result<Value, String>) -> ShellOutcome {
    match result {
        Ok(value) => ShellOutcome::Print(value),
        Err(error) => ShellOutcome::Print(json!({ "error": error })),
    }
}

/// Execute one shell line against the application context.
pub async fn handle_line(ctx: &AppContext, line: &str) -> ShellOutcome {
    match ShellCommand::parse(line) {
        ShellCommand::Ask(message) => match serde_json::to_value(chat(ctx, &message).await) {
            Ok(value) => ShellOutcome::Print(value),
            Err(e) => ShellOutcome::Print(json!({ "error": e.to_string() })),
        },
        ShellCommand::Connect(args) => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            to_outcome(connect(ctx, &args).await)
        }
        ShellCommand::Disconnect => to_outcome(disconnect(ctx).await),
        ShellCommand::Exec(sql) => to_outcome(exec_sql(ctx, &sql).await),
        ShellCommand::Schema(schema) => to_outcome(describe_schema(ctx, schema.as_deref()).await),
        ShellCommand::CacheStatus => to_outcome(cache_status(ctx).await),
        ShellCommand::Invalidate(target) => to_outcome(invalidate(ctx, target.as_deref()).await),
        ShellCommand::Help => ShellOutcome::Text(HELP_TEXT.to_string()),
        ShellCommand::Quit => ShellOutcome::Quit,
        ShellCommand::Empty => ShellOutcome::Nothing,
        ShellCommand::Unknown(name) => ShellOutcome::Print(json!({
            "error": format!("Unknown command ':{}'. Type :help for the list.", name)
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_cache::MetadataCache;
    use crate::settings::AppSettings;
    use crate::tests::support::{orders_metadata, FakeDatabase, ScriptedLlm};
    use crate::tool_registry::ToolCatalog;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(llm: ScriptedLlm) -> AppContext {
        let db = Arc::new(FakeDatabase::new().with_table("public", "orders", orders_metadata()));
        AppContext::assemble(
            db,
            Arc::new(MetadataCache::new(Duration::from_secs(300))),
            Arc::new(llm),
            Arc::new(ToolCatalog::builtin()),
            AppSettings::default(),
        )
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ShellCommand::parse("  "), ShellCommand::Empty);
        assert_eq!(
            ShellCommand::parse("how many orders?"),
            ShellCommand::Ask("how many orders?".to_string())
        );
        assert_eq!(
            ShellCommand::parse(":connect shop.db sales=sales.db"),
            ShellCommand::Connect(vec!["shop.db".to_string(), "sales=sales.db".to_string()])
        );
        assert_eq!(
            ShellCommand::parse(":exec  DROP TABLE x "),
            ShellCommand::Exec("DROP TABLE x".to_string())
        );
        assert_eq!(ShellCommand::parse(":invalidate"), ShellCommand::Invalidate(None));
        assert_eq!(
            ShellCommand::parse(":invalidate Public.Orders"),
            ShellCommand::Invalidate(Some("Public.Orders".to_string()))
        );
        assert_eq!(ShellCommand::parse(":q"), ShellCommand::Quit);
        assert_eq!(
            ShellCommand::parse(":frobnicate"),
            ShellCommand::Unknown("frobnicate".to_string())
        );
    }

    #[tokio::test]
    async fn test_ask_returns_preview() {
        let ctx = context(ScriptedLlm::new([
            r#"FINAL_SQL: {"sql": "SELECT COUNT(*) FROM orders", "explanation": "Counts orders"}"#,
        ]));
        let outcome = handle_line(&ctx, "how many orders?").await;
        assert_eq!(
            outcome,
            ShellOutcome::Print(json!({
                "generated_sql": "SELECT COUNT(*) FROM orders",
                "explanation": "Counts orders",
                "preview": PREVIEW_NOTICE,
            }))
        );
    }

    #[tokio::test]
    async fn test_ask_reports_errors() {
        let ctx = context(ScriptedLlm::new([r#"FINAL_SQL: {"explanation": "no sql"}"#]));
        let outcome = handle_line(&ctx, "anything").await;
        assert_eq!(
            outcome,
            ShellOutcome::Print(json!({ "error": "Invalid FINAL_SQL JSON" }))
        );
    }

    #[tokio::test]
    async fn test_invalidate_targets() {
        let ctx = context(ScriptedLlm::new(Vec::<String>::new()));
        ctx.cache.put("public", "orders", orders_metadata()).await;
        ctx.cache.put("public", "customers", orders_metadata()).await;
        ctx.cache.put("sales", "leads", orders_metadata()).await;

        assert_eq!(
            handle_line(&ctx, ":invalidate Public.Orders ").await,
            ShellOutcome::Print(json!({ "invalidated": 1 }))
        );
        assert_eq!(
            handle_line(&ctx, ":invalidate public").await,
            ShellOutcome::Print(json!({ "invalidated": 1 }))
        );
        assert_eq!(
            handle_line(&ctx, ":invalidate").await,
            ShellOutcome::Print(json!({ "invalidated": 1 }))
        );
        assert!(ctx.cache.status().await.entries.is_empty());
    }

    #[tokio::test]
    async fn test_exec_and_disconnect() {
        let ctx = context(ScriptedLlm::new(Vec::<String>::new()));
        assert_eq!(
            handle_line(&ctx, ":exec DELETE FROM orders").await,
            ShellOutcome::Print(json!({
                "message": "Statement executed successfully",
                "rows_affected": 0
            }))
        );
        assert_eq!(
            handle_line(&ctx, ":disconnect").await,
            ShellOutcome::Print(json!({ "disconnected": true }))
        );
        assert_eq!(
            handle_line(&ctx, ":schema").await,
            ShellOutcome::Print(json!({ "error": "No active database connection" }))
        );
    }
}
