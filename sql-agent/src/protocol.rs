use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ============ Tool Schema ============

/// Declarative tool definition shown to the model (catalog entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    json!({"type": "object", "properties": {}})
}

impl ToolSchema {
    /// Create a new tool schema with minimal required fields
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            parameters: empty_parameters(),
        }
    }
}

// ============ Conversation ============

/// Role of a turn in the agent conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One turn of the running conversation fed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

// ============ Tool Calls ============

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Trim and lowercase the string-valued `schema` and `table` arguments.
    pub fn normalize(&mut self) {
        for key in ["schema", "table"] {
            if let Some(Value::String(s)) = self.arguments.get_mut(key) {
                *s = s.trim().to_lowercase();
            }
        }
    }

    /// Get a string argument, treating empty strings as absent.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Result of a tool execution, fed back to the model as data.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Payload(Value),
    Error(String),
}

impl ToolResult {
    pub fn error(reason: impl Into<String>) -> Self {
        ToolResult::Error(reason.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            ToolResult::Payload(value) => value.clone(),
            ToolResult::Error(reason) => json!({ "error": reason }),
        }
    }
}

// ============ Final Answer ============

/// The model's committed SQL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub sql: String,
    pub explanation: String,
}

// ============ Table Metadata ============

/// Column description returned by introspection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Foreign key edge from a local column to a referenced column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub references_schema: String,
    pub references_table: String,
    pub references_column: String,
}

/// Structural metadata for a single table, as cached and served by `describe_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

// ============ SQL Execution ============

/// Outcome of executing a statement against the active connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteOutcome {
    Rows { rows: Vec<Map<String, Value>> },
    Ack { message: String, rows_affected: usize },
}
