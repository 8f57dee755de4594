//! Table Sample Implementation
//!
//! Reads a bounded number of rows from one table. Identifiers are quoted and
//! the row count is clamped, so the model can only ever trigger
//! `SELECT * FROM "schema"."table" LIMIT n`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::database::{quote_ident, DatabaseError, SharedDatabase};
use crate::protocol::ExecuteOutcome;

/// Input for get_table_sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSampleInput {
    pub schema: String,
    pub table: String,
    /// Requested row count; numbers and numeric strings are accepted
    #[serde(default)]
    pub limit: Option<Value>,
}

/// Output from get_table_sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSampleOutput {
    pub schema: String,
    pub table: String,
    pub limit: usize,
    pub rows: Vec<Map<String, Value>>,
}

/// Executor for get_table_sample
pub struct TableSampleExecutor {
    db: SharedDatabase,
    default_limit: usize,
    max_limit: usize,
}

impl TableSampleExecutor {
    pub fn new(db: SharedDatabase, default_limit: usize, max_limit: usize) -> Self {
        Self {
            db,
            default_limit,
            max_limit: max_limit.max(1),
        }
    }

    /// Requested limit, or the default when absent or not a positive integer,
    /// clamped to the configured maximum.
    pub fn resolve_limit(&self, raw: Option<&Value>) -> usize {
        let requested = match raw {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        let limit = match requested {
            Some(n) if n > 0 => n as usize,
            _ => self.default_limit,
        };
        limit.min(self.max_limit)
    }

    pub fn build_sql(schema: &str, table: &str, limit: usize) -> String {
        format!(
            "SELECT * FROM {}.{} LIMIT {}",
            quote_ident(schema),
            quote_ident(table),
            limit
        )
    }

    pub async fn execute(&self, input: TableSampleInput) -> Result<TableSampleOutput, DatabaseError> {
        let limit = self.resolve_limit(input.limit.as_ref());
        let sql = Self::build_sql(&input.schema, &input.table, limit);
        debug!("Sampling with {}", sql);

        let rows = match self.db.execute(&sql).await? {
            ExecuteOutcome::Rows { rows } => rows,
            ExecuteOutcome::Ack { .. } => Vec::new(),
        };

        Ok(TableSampleOutput {
            schema: input.schema,
            table: input.table,
            limit,
            rows,
        })
    }
}
