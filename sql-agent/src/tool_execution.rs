//! Tool execution for the agentic loop.
//!
//! The dispatcher routes a normalized `ToolInvocation` to the introspection
//! service, the metadata cache, or the sampling executor. Everything except a
//! missing connection comes back as `ToolResult` data so the model can react
//! to it; a missing connection ends the run.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agentic_state::AgentError;
use crate::database::{DatabaseError, SharedDatabase};
use crate::metadata_cache::SharedMetadataCache;
use crate::protocol::{ToolInvocation, ToolResult};
use crate::tools::{DescribeTableExecutor, DescribeTableInput, TableSampleExecutor, TableSampleInput};

/// Placeholder a model may copy from the catalog instead of a real schema
pub const DEFAULT_SCHEMA_PLACEHOLDER: &str = "<default_schema>";

/// The closed set of tools the dispatcher understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlTool {
    ListSchemas,
    ListTables,
    GetColumns,
    GetPrimaryKeys,
    GetForeignKeys,
    DescribeTable,
    DescribeSchema,
    GetTableSample,
    Unknown(String),
}

impl SqlTool {
    pub fn from_name(name: &str) -> Self {
        match name {
            "list_schemas" => SqlTool::ListSchemas,
            "list_tables" => SqlTool::ListTables,
            "get_columns" => SqlTool::GetColumns,
            "get_primary_keys" => SqlTool::GetPrimaryKeys,
            "get_foreign_keys" => SqlTool::GetForeignKeys,
            "describe_table" => SqlTool::DescribeTable,
            "describe_schema" => SqlTool::DescribeSchema,
            "get_table_sample" => SqlTool::GetTableSample,
            other => SqlTool::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SqlTool::ListSchemas => "list_schemas",
            SqlTool::ListTables => "list_tables",
            SqlTool::GetColumns => "get_columns",
            SqlTool::GetPrimaryKeys => "get_primary_keys",
            SqlTool::GetForeignKeys => "get_foreign_keys",
            SqlTool::DescribeTable => "describe_table",
            SqlTool::DescribeSchema => "describe_schema",
            SqlTool::GetTableSample => "get_table_sample",
            SqlTool::Unknown(name) => name,
        }
    }

    /// Tools whose `schema` argument the agent may fill from the session.
    pub fn requires_schema(&self) -> bool {
        !matches!(self, SqlTool::ListSchemas | SqlTool::Unknown(_))
    }
}

/// Whether a schema argument is absent for auto-fill purposes:
/// missing, `null`, blank, or the `<default_schema>` placeholder.
pub fn is_schema_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case(DEFAULT_SCHEMA_PLACEHOLDER)
        }
        Some(_) => false,
    }
}

/// Serialize a payload into a tool result.
fn payload<T: Serialize>(value: &T) -> ToolResult {
    match serde_json::to_value(value) {
        Ok(v) => ToolResult::Payload(v),
        Err(e) => ToolResult::error(format!("Failed to serialize tool result: {}", e)),
    }
}

fn missing_argument(tool: &SqlTool, key: &str) -> ToolResult {
    ToolResult::error(format!(
        "Missing required argument '{}' for {}",
        key,
        tool.name()
    ))
}

/// Routes tool invocations. Shared by every agent run.
pub struct ToolDispatcher {
    db: SharedDatabase,
    describe: DescribeTableExecutor,
    sample: TableSampleExecutor,
}

impl ToolDispatcher {
    pub fn new(
        db: SharedDatabase,
        cache: SharedMetadataCache,
        sample_rows_default: usize,
        sample_rows_max: usize,
    ) -> Self {
        Self {
            describe: DescribeTableExecutor::new(db.clone(), cache),
            sample: TableSampleExecutor::new(db.clone(), sample_rows_default, sample_rows_max),
            db,
        }
    }

    /// Execute one invocation. Only a missing connection is an `Err`.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult, AgentError> {
        let mut invocation = invocation.clone();
        invocation.normalize();

        if !self.db.is_connected().await {
            return Err(AgentError::NoActiveConnection);
        }

        let tool = SqlTool::from_name(&invocation.name);
        let arguments = Value::Object(invocation.arguments.clone());
        debug!(tool = tool.name(), arguments = %arguments, "Dispatching tool");

        match self.dispatch(&tool, &invocation).await {
            Ok(result) => Ok(result),
            Err(DatabaseError::NotConnected) => Err(AgentError::NoActiveConnection),
            Err(e) => {
                warn!("Tool {} failed: {}", tool.name(), e);
                Ok(ToolResult::error(e.to_string()))
            }
        }
    }

    async fn dispatch(
        &self,
        tool: &SqlTool,
        invocation: &ToolInvocation,
    ) -> Result<ToolResult, DatabaseError> {
        let schema = invocation.str_arg("schema");
        let table = invocation.str_arg("table");

        let result = match (tool, schema, table) {
            (SqlTool::ListSchemas, _, _) => payload(&self.db.schemas().await?),
            (SqlTool::Unknown(name), _, _) => ToolResult::error(format!("Unknown tool: {}", name)),
            (_, None, _) => missing_argument(tool, "schema"),
            (SqlTool::ListTables, Some(schema), _) => {
                payload(&self.db.table_names(schema).await?)
            }
            (SqlTool::DescribeSchema, Some(schema), _) => {
                payload(&self.db.schema_grouped(Some(schema)).await?)
            }
            (_, _, None) => missing_argument(tool, "table"),
            (SqlTool::GetColumns, Some(schema), Some(table)) => {
                payload(&self.db.columns(schema, table).await?)
            }
            (SqlTool::GetPrimaryKeys, Some(schema), Some(table)) => {
                payload(&self.db.primary_keys(schema, table).await?)
            }
            (SqlTool::GetForeignKeys, Some(schema), Some(table)) => {
                payload(&self.db.foreign_keys(schema, table).await?)
            }
            (SqlTool::DescribeTable, Some(schema), Some(table)) => {
                let input = DescribeTableInput {
                    schema: schema.to_string(),
                    table: table.to_string(),
                };
                let (metadata, _source) = self.describe.execute(&input).await?;
                payload(&metadata)
            }
            (SqlTool::GetTableSample, Some(schema), Some(table)) => {
                let input = TableSampleInput {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    limit: invocation.arguments.get("limit").cloned(),
                };
                payload(&self.sample.execute(input).await?)
            }
        };
        Ok(result)
    }
}
