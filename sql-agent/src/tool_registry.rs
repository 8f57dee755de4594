//! Tool Registry - the static catalog of introspection tools shown to the model.
//!
//! The built-in catalog describes the dispatcher's closed tool set. An operator
//! may replace it with a JSON file (an array of `{name, description, parameters}`)
//! to reword descriptions; the file is read once at startup. Declaration order
//! is preserved because the prompt renders the catalog in that order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::protocol::ToolSchema;
use crate::tool_execution::SqlTool;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read tool catalog {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid tool catalog {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Tool catalog is empty")]
    Empty,
    #[error("Tool {0:?} is declared more than once")]
    Duplicate(String),
}

// ========== Built-in Tool Definitions ==========

fn schema_only() -> Value {
    json!({
        "type": "object",
        "properties": {
            "schema": { "type": "string", "description": "Schema name returned by list_schemas" }
        },
        "required": ["schema"]
    })
}

fn schema_and_table() -> Value {
    json!({
        "type": "object",
        "properties": {
            "schema": { "type": "string", "description": "Schema name returned by list_schemas" },
            "table": { "type": "string", "description": "Table name returned by list_tables" }
        },
        "required": ["schema", "table"]
    })
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: Some(description.to_string()),
        parameters,
    }
}

/// The built-in catalog, one entry per dispatchable tool.
pub fn builtin_tools() -> Vec<ToolSchema> {
    vec![
        tool(
            SqlTool::ListSchemas.name(),
            "List all schemas available on the active connection.",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            SqlTool::ListTables.name(),
            "List the tables and views of a schema.",
            schema_only(),
        ),
        tool(
            SqlTool::GetColumns.name(),
            "Get the columns of a table: name, data type, nullability and default.",
            schema_and_table(),
        ),
        tool(
            SqlTool::GetPrimaryKeys.name(),
            "Get the primary key columns of a table, in key order.",
            schema_and_table(),
        ),
        tool(
            SqlTool::GetForeignKeys.name(),
            "Get the foreign keys of a table and the columns they reference. Call before writing a JOIN.",
            schema_and_table(),
        ),
        tool(
            SqlTool::DescribeTable.name(),
            "Get columns, primary keys and foreign keys of a table in one call.",
            schema_and_table(),
        ),
        tool(
            SqlTool::DescribeSchema.name(),
            "Describe every table of a schema (columns, primary keys, foreign keys).",
            schema_only(),
        ),
        tool(
            SqlTool::GetTableSample.name(),
            "Read a few rows of a table to see real values.",
            json!({
                "type": "object",
                "properties": {
                    "schema": { "type": "string" },
                    "table": { "type": "string" },
                    "limit": { "type": "integer", "description": "Number of rows (default 5)" }
                },
                "required": ["schema", "table"]
            }),
        ),
    ]
}

// ========== Catalog ==========

/// Ordered, immutable tool catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCatalog {
    tools: Vec<ToolSchema>,
}

/// Shared reference to the loaded catalog
pub type SharedToolCatalog = Arc<ToolCatalog>;

impl ToolCatalog {
    pub fn builtin() -> Self {
        Self {
            tools: builtin_tools(),
        }
    }

    /// Build a catalog, rejecting empty or duplicate declarations.
    pub fn from_tools(tools: Vec<ToolSchema>) -> Result<Self, CatalogError> {
        if tools.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(CatalogError::Duplicate(tool.name.clone()));
            }
        }
        Ok(Self { tools })
    }

    /// Read a catalog from a JSON array file.
    pub async fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let tools: Vec<ToolSchema> =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let catalog = Self::from_tools(tools)?;
        for tool in &catalog.tools {
            if matches!(SqlTool::from_name(&tool.name), SqlTool::Unknown(_)) {
                warn!(
                    "Catalog declares {:?}, which no dispatcher handles; calls will return an error",
                    tool.name
                );
            }
        }
        info!("Loaded {} tools from {:?}", catalog.tools.len(), path);
        Ok(catalog)
    }

    /// The override file when configured, otherwise the built-in catalog.
    pub async fn load(override_path: Option<&Path>) -> Result<Self, CatalogError> {
        match override_path {
            Some(path) => Self::from_file(path).await,
            None => Ok(Self::builtin()),
        }
    }

    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
