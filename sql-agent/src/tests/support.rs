//! Test doubles shared by unit and integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use crate::database::{ConnectionConfig, ConnectionProvider, DatabaseError, SchemaIntrospector};
use crate::llm_runtime::{LlmError, LlmRuntime};
use crate::protocol::{ColumnInfo, ExecuteOutcome, ForeignKeyInfo, TableMetadata};

// ============ Fixtures ============

fn column(name: &str, data_type: &str, nullable: bool) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        default: None,
    }
}

/// `orders(id, customer_id -> customers.id, total)`
pub fn orders_metadata() -> TableMetadata {
    TableMetadata {
        columns: vec![
            column("id", "INTEGER", false),
            column("customer_id", "INTEGER", true),
            column("total", "REAL", true),
        ],
        primary_keys: vec!["id".to_string()],
        foreign_keys: vec![ForeignKeyInfo {
            column: "customer_id".to_string(),
            references_schema: "public".to_string(),
            references_table: "customers".to_string(),
            references_column: "id".to_string(),
        }],
    }
}

// ============ Fake Database ============

/// Pauses `columns()` after it has read the table: `reached` fires, then the
/// call waits for `release`.
#[derive(Default)]
pub struct ColumnsGate {
    pub reached: Notify,
    pub release: Notify,
}

struct FakeState {
    connected: bool,
    calls: Vec<String>,
    executed: Vec<String>,
}

/// In-memory database keyed by `(schema, table)`.
///
/// `SELECT` statements return the configured sample rows; anything else is
/// acknowledged with zero affected rows.
pub struct FakeDatabase {
    tables: BTreeMap<(String, String), TableMetadata>,
    sample_rows: Vec<serde_json::Map<String, Value>>,
    columns_gate: Option<Arc<ColumnsGate>>,
    state: Mutex<FakeState>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self {
            tables: BTreeMap::new(),
            sample_rows: Vec::new(),
            columns_gate: None,
            state: Mutex::new(FakeState {
                connected: true,
                calls: Vec::new(),
                executed: Vec::new(),
            }),
        }
    }

    pub fn with_table(mut self, schema: &str, table: &str, metadata: TableMetadata) -> Self {
        self.tables
            .insert((schema.to_string(), table.to_string()), metadata);
        self
    }

    pub fn with_sample_rows(mut self, rows: Vec<Value>) -> Self {
        self.sample_rows = rows
            .into_iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        self
    }

    pub fn with_columns_gate(mut self, gate: Arc<ColumnsGate>) -> Self {
        self.columns_gate = Some(gate);
        self
    }

    pub fn disconnected(self) -> Self {
        self.state.lock().unwrap().connected = false;
        self
    }

    /// Number of introspection calls whose name starts with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Statements passed to `execute`, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    fn record(&self, call: String) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(DatabaseError::NotConnected);
        }
        state.calls.push(call);
        Ok(())
    }

    fn table(&self, schema: &str, table: &str) -> Result<&TableMetadata, DatabaseError> {
        self.tables
            .get(&(schema.to_string(), table.to_string()))
            .ok_or_else(|| DatabaseError::UnknownTable {
                schema: schema.to_string(),
                table: table.to_string(),
            })
    }
}

impl Default for FakeDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProvider for FakeDatabase {
    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn execute(&self, sql: &str) -> Result<ExecuteOutcome, DatabaseError> {
        self.record(format!("execute:{}", sql))?;
        self.state.lock().unwrap().executed.push(sql.to_string());

        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            Ok(ExecuteOutcome::Rows {
                rows: self.sample_rows.clone(),
            })
        } else {
            Ok(ExecuteOutcome::Ack {
                message: "Statement executed successfully".to_string(),
                rows_affected: 0,
            })
        }
    }

    async fn connect(&self, _config: ConnectionConfig) -> Result<(), DatabaseError> {
        self.state.lock().unwrap().connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let was_connected = state.connected;
        state.connected = false;
        Ok(was_connected)
    }
}

#[async_trait]
impl SchemaIntrospector for FakeDatabase {
    async fn schemas(&self) -> Result<Vec<String>, DatabaseError> {
        self.record("schemas".to_string())?;
        let mut schemas: Vec<String> = self.tables.keys().map(|(s, _)| s.clone()).collect();
        schemas.dedup();
        Ok(schemas)
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        self.record(format!("table_names:{}", schema))?;
        Ok(self
            .tables
            .keys()
            .filter(|(s, _)| s == schema)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        self.record(format!("columns:{}.{}", schema, table))?;
        let columns = self.table(schema, table)?.columns.clone();
        if let Some(gate) = &self.columns_gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        Ok(columns)
    }

    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError> {
        self.record(format!("primary_keys:{}.{}", schema, table))?;
        Ok(self.table(schema, table)?.primary_keys.clone())
    }

    async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, DatabaseError> {
        self.record(format!("foreign_keys:{}.{}", schema, table))?;
        Ok(self.table(schema, table)?.foreign_keys.clone())
    }

    async fn schema_grouped(
        &self,
        schema: Option<&str>,
    ) -> Result<BTreeMap<String, TableMetadata>, DatabaseError> {
        self.record(format!("schema_grouped:{}", schema.unwrap_or("*")))?;
        Ok(self
            .tables
            .iter()
            .filter(|((s, _), _)| schema.map_or(true, |wanted| s == wanted))
            .map(|((s, t), md)| (format!("{}.{}", s, t), md.clone()))
            .collect())
    }
}

// ============ Scripted LLM ============

enum Script {
    Replies(VecDeque<String>),
    Timeout,
}

/// LLM runtime that replays canned replies.
///
/// Once the script runs out the last reply repeats; a script with no replies
/// at all fails the process.
pub struct ScriptedLlm {
    script: Mutex<Script>,
    last: Mutex<Option<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(Script::Replies(
                replies.into_iter().map(Into::into).collect(),
            )),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call times out
    pub fn timing_out() -> Self {
        Self {
            script: Mutex::new(Script::Timeout),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmRuntime for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn run_text(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let next = match &mut *self.script.lock().unwrap() {
            Script::Timeout => {
                return Err(LlmError::Timeout {
                    model: "scripted".to_string(),
                    timeout: std::time::Duration::from_secs(60),
                })
            }
            Script::Replies(queue) => queue.pop_front(),
        };

        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().ok_or_else(|| LlmError::ProcessFailed {
            status: "exit status: 1".to_string(),
            output: "script is empty".to_string(),
        })
    }
}
