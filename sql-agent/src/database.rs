//! Database boundary consumed by the agent core.
//!
//! Two roles, one handle:
//! - `ConnectionProvider`: the single process-wide connection
//!   (connect replaces, disconnect drops, execute runs a statement)
//! - `SchemaIntrospector`: read-only structural facts about that connection
//!
//! `DatabaseService` is the production implementation. It forwards to the
//! SQLite actor and runs the schema change monitor after every successful
//! statement and every connection change.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::actors::sqlite_actor::SqliteHandle;
use crate::protocol::{ColumnInfo, ExecuteOutcome, ForeignKeyInfo, TableMetadata};
use crate::schema_monitor::SchemaChangeMonitor;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("No active database connection")]
    NotConnected,
    #[error("Failed to connect to {path}: {reason}")]
    ConnectFailed { path: String, reason: String },
    #[error("Unknown table: {schema}.{table}")]
    UnknownTable { schema: String, table: String },
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database actor stopped")]
    ActorUnavailable,
}

/// Extra database attached under its own schema name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedDatabase {
    pub name: String,
    pub path: PathBuf,
}

/// Where and how to open the active connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Main database file, or `:memory:`
    pub path: PathBuf,
    #[serde(default)]
    pub attachments: Vec<AttachedDatabase>,
    #[serde(default)]
    pub read_only: bool,
}

impl ConnectionConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attachments: Vec::new(),
            read_only: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// The single active connection.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn is_connected(&self) -> bool;
    async fn execute(&self, sql: &str) -> Result<ExecuteOutcome, DatabaseError>;
    /// Open a connection, replacing any previous one. Failure leaves no connection.
    async fn connect(&self, config: ConnectionConfig) -> Result<(), DatabaseError>;
    /// Returns whether a connection was actually closed.
    async fn disconnect(&self) -> Result<bool, DatabaseError>;
}

/// Read-only structural queries against the active connection.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn schemas(&self) -> Result<Vec<String>, DatabaseError>;
    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError>;
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError>;
    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError>;
    async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, DatabaseError>;
    /// Metadata for every table of `schema` (or of all schemas), keyed `schema.table`.
    async fn schema_grouped(
        &self,
        schema: Option<&str>,
    ) -> Result<BTreeMap<String, TableMetadata>, DatabaseError>;
}

/// Everything the tool dispatcher needs from the database.
pub trait Database: ConnectionProvider + SchemaIntrospector {}

impl<T: ConnectionProvider + SchemaIntrospector> Database for T {}

/// Shared reference to the active database
pub type SharedDatabase = Arc<dyn Database>;

/// Quote an identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ============ Production Implementation ============

/// SQLite-backed database service with DDL-aware cache invalidation.
pub struct DatabaseService {
    sqlite: SqliteHandle,
    monitor: Arc<SchemaChangeMonitor>,
}

impl DatabaseService {
    pub fn new(sqlite: SqliteHandle, monitor: Arc<SchemaChangeMonitor>) -> Self {
        Self { sqlite, monitor }
    }
}

#[async_trait]
impl ConnectionProvider for DatabaseService {
    async fn is_connected(&self) -> bool {
        self.sqlite.is_connected().await
    }

    async fn execute(&self, sql: &str) -> Result<ExecuteOutcome, DatabaseError> {
        let outcome = self.sqlite.execute(sql).await?;
        self.monitor.on_executed(sql).await;
        Ok(outcome)
    }

    async fn connect(&self, config: ConnectionConfig) -> Result<(), DatabaseError> {
        let path = config.path.display().to_string();
        let result = self.sqlite.connect(config).await;
        // A failed connect has already dropped the previous connection
        self.monitor.on_connection_changed().await;
        match result {
            Ok(()) => {
                info!("Connected to database {}", path);
                Ok(())
            }
            Err(e) => {
                warn!("Database connection failed: {}", e);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<bool, DatabaseError> {
        let closed = self.sqlite.disconnect().await?;
        if closed {
            self.monitor.on_connection_changed().await;
        }
        Ok(closed)
    }
}

#[async_trait]
impl SchemaIntrospector for DatabaseService {
    async fn schemas(&self) -> Result<Vec<String>, DatabaseError> {
        self.sqlite.schemas().await
    }

    async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        self.sqlite.table_names(schema).await
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        self.sqlite.columns(schema, table).await
    }

    async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError> {
        self.sqlite.primary_keys(schema, table).await
    }

    async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, DatabaseError> {
        self.sqlite.foreign_keys(schema, table).await
    }

    async fn schema_grouped(
        &self,
        schema: Option<&str>,
    ) -> Result<BTreeMap<String, TableMetadata>, DatabaseError> {
        self.sqlite.schema_grouped(schema).await
    }
}
