//! Tool dispatch, cache invalidation and agent runs against a real SQLite
//! connection owned by the actor thread.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::actors::SqliteHandle;
use crate::agentic_loop::{run_agent, AgentConfig, AgentContext};
use crate::agentic_state::AgentError;
use crate::database::{ConnectionConfig, ConnectionProvider, DatabaseService, SharedDatabase};
use crate::metadata_cache::{MetadataCache, SharedMetadataCache};
use crate::protocol::{ExecuteOutcome, ToolInvocation, ToolResult};
use crate::schema_monitor::SchemaChangeMonitor;
use crate::tests::support::ScriptedLlm;
use crate::tool_execution::ToolDispatcher;
use crate::tool_registry::ToolCatalog;

const FIXTURE: [&str; 4] = [
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER REFERENCES customers(id), total REAL)",
    "INSERT INTO customers (id, name) VALUES (1, 'Ada')",
    "INSERT INTO orders (id, customer_id, total) VALUES (1, 1, 9.5), (2, 1, 3.0)",
];

async fn connected_service() -> (SharedDatabase, SharedMetadataCache) {
    let cache: SharedMetadataCache = Arc::new(MetadataCache::new(Duration::from_secs(300)));
    let monitor = Arc::new(SchemaChangeMonitor::new(cache.clone()));
    let db: SharedDatabase = Arc::new(DatabaseService::new(
        SqliteHandle::spawn().unwrap(),
        monitor,
    ));
    db.connect(ConnectionConfig::in_memory()).await.unwrap();
    for statement in FIXTURE {
        db.execute(statement).await.unwrap();
    }
    (db, cache)
}

fn call(name: &str, args: Value) -> ToolInvocation {
    ToolInvocation::new(name, args.as_object().cloned().unwrap_or_default())
}

fn column_names(result: &ToolResult) -> Vec<String> {
    result.to_json()["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_alter_table_refreshes_described_metadata() {
    let (db, cache) = connected_service().await;
    let dispatcher = ToolDispatcher::new(db.clone(), cache.clone(), 5, 100);
    let describe = call("describe_table", json!({"schema": "main", "table": "orders"}));

    let before = dispatcher.execute(&describe).await.unwrap();
    assert_eq!(column_names(&before), vec!["id", "customer_id", "total"]);
    assert!(cache.get("main", "orders").await.is_some());

    let outcome = db
        .execute("ALTER TABLE main.orders ADD COLUMN note TEXT")
        .await
        .unwrap();
    assert!(matches!(outcome, ExecuteOutcome::Ack { .. }));
    assert!(cache.get("main", "orders").await.is_none());

    let after = dispatcher.execute(&describe).await.unwrap();
    assert_eq!(column_names(&after), vec!["id", "customer_id", "total", "note"]);
}

#[tokio::test]
async fn test_sample_reads_rows() {
    let (db, cache) = connected_service().await;
    let dispatcher = ToolDispatcher::new(db, cache, 5, 100);

    let result = dispatcher
        .execute(&call(
            "get_table_sample",
            json!({"schema": "main", "table": "orders", "limit": 1}),
        ))
        .await
        .unwrap();

    let payload = result.to_json();
    assert_eq!(payload["limit"], json!(1));
    assert_eq!(payload["rows"], json!([{"id": 1, "customer_id": 1, "total": 9.5}]));
}

#[tokio::test]
async fn test_agent_run_over_sqlite() {
    let (db, cache) = connected_service().await;
    let llm = Arc::new(ScriptedLlm::new([
        r#"TOOL_CALL: {"name": "list_schemas", "arguments": {}}"#,
        r#"TOOL_CALL: {"name": "get_foreign_keys", "arguments": {"schema": "<default_schema>", "table": "Orders"}}"#,
        r#"FINAL_SQL: {"sql": "SELECT c.name, SUM(o.total) FROM orders o JOIN customers c ON c.id = o.customer_id GROUP BY c.name", "explanation": "Revenue per customer"}"#,
    ]));
    let ctx = AgentContext {
        llm,
        catalog: Arc::new(ToolCatalog::builtin()),
        dispatcher: Arc::new(ToolDispatcher::new(db, cache, 5, 100)),
        config: AgentConfig::default(),
    };

    let run = run_agent(&ctx, "Revenue per customer").await;

    assert!(run.outcome.is_ok(), "{:?}", run.outcome);
    assert_eq!(run.conversation.selected_schema(), Some("main"));
    let last_tool = run
        .conversation
        .turns()
        .iter()
        .rev()
        .find(|t| t.role == crate::protocol::Role::Tool)
        .map(|t| t.content.clone())
        .unwrap();
    let fks: Value = serde_json::from_str(&last_tool).unwrap();
    assert_eq!(fks[0]["references_table"], json!("customers"));
}

#[tokio::test]
async fn test_reconnect_drops_metadata_of_previous_database() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.db");
    let second = dir.path().join("b.db");
    rusqlite::Connection::open(&first)
        .unwrap()
        .execute_batch("CREATE TABLE orders (id INTEGER PRIMARY KEY)")
        .unwrap();
    rusqlite::Connection::open(&second)
        .unwrap()
        .execute_batch("CREATE TABLE orders (sku TEXT, qty INTEGER)")
        .unwrap();

    let cache: SharedMetadataCache = Arc::new(MetadataCache::new(Duration::from_secs(300)));
    let monitor = Arc::new(SchemaChangeMonitor::new(cache.clone()));
    let db: SharedDatabase = Arc::new(DatabaseService::new(
        SqliteHandle::spawn().unwrap(),
        monitor,
    ));
    let dispatcher = ToolDispatcher::new(db.clone(), cache.clone(), 5, 100);
    let describe = call("describe_table", json!({"schema": "main", "table": "orders"}));

    db.connect(ConnectionConfig::new(&first)).await.unwrap();
    let before = dispatcher.execute(&describe).await.unwrap();
    assert_eq!(column_names(&before), vec!["id"]);

    db.connect(ConnectionConfig::new(&second)).await.unwrap();
    assert!(cache.get("main", "orders").await.is_none());
    let after = dispatcher.execute(&describe).await.unwrap();
    assert_eq!(column_names(&after), vec!["sku", "qty"]);

    assert!(db.disconnect().await.unwrap());
    assert!(cache.status().await.entries.is_empty());
}

#[tokio::test]
async fn test_disconnect_makes_tools_fatal() {
    let (db, cache) = connected_service().await;
    let dispatcher = ToolDispatcher::new(db.clone(), cache, 5, 100);

    assert!(db.disconnect().await.unwrap());
    let err = dispatcher
        .execute(&call("list_schemas", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NoActiveConnection));
}
