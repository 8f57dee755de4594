//! SQLite Actor - owns the single active database connection.
//!
//! This actor handles:
//! - Opening the main database (plus optional attachments), replacing any previous connection
//! - Executing arbitrary SQL and shaping results as JSON rows
//! - Introspection through `sqlite_master` and `PRAGMA` queries
//!
//! `rusqlite::Connection` is blocking, so the actor runs on its own OS thread
//! and receives messages with `blocking_recv`. Callers talk to it through the
//! cloneable `SqliteHandle`.

use std::collections::BTreeMap;
use std::thread;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::database::{quote_ident, ConnectionConfig, DatabaseError};
use crate::protocol::{ColumnInfo, ExecuteOutcome, ForeignKeyInfo, TableMetadata};

type Reply<T> = oneshot::Sender<Result<T, DatabaseError>>;

/// Messages for the SQLite Actor
#[derive(Debug)]
pub enum SqliteMsg {
    Connect {
        config: ConnectionConfig,
        respond_to: Reply<()>,
    },
    Disconnect {
        respond_to: Reply<bool>,
    },
    IsConnected {
        respond_to: oneshot::Sender<bool>,
    },
    ExecuteSql {
        sql: String,
        respond_to: Reply<ExecuteOutcome>,
    },
    ListSchemas {
        respond_to: Reply<Vec<String>>,
    },
    ListTables {
        schema: String,
        respond_to: Reply<Vec<String>>,
    },
    GetColumns {
        schema: String,
        table: String,
        respond_to: Reply<Vec<ColumnInfo>>,
    },
    GetPrimaryKeys {
        schema: String,
        table: String,
        respond_to: Reply<Vec<String>>,
    },
    GetForeignKeys {
        schema: String,
        table: String,
        respond_to: Reply<Vec<ForeignKeyInfo>>,
    },
    GetSchemaGrouped {
        schema: Option<String>,
        respond_to: Reply<BTreeMap<String, TableMetadata>>,
    },
}

/// SQLite Actor
pub struct SqliteActor {
    rx: mpsc::Receiver<SqliteMsg>,
    connection: Option<Connection>,
}

impl SqliteActor {
    pub fn new(rx: mpsc::Receiver<SqliteMsg>) -> Self {
        Self {
            rx,
            connection: None,
        }
    }

    /// Run the actor's message loop. Blocks the calling thread.
    pub fn run(mut self) {
        debug!("SqliteActor started");

        while let Some(msg) = self.rx.blocking_recv() {
            match msg {
                SqliteMsg::Connect { config, respond_to } => {
                    let _ = respond_to.send(self.connect(&config));
                }
                SqliteMsg::Disconnect { respond_to } => {
                    let closed = self.connection.take().is_some();
                    if closed {
                        info!("Database connection closed");
                    }
                    let _ = respond_to.send(Ok(closed));
                }
                SqliteMsg::IsConnected { respond_to } => {
                    let _ = respond_to.send(self.connection.is_some());
                }
                SqliteMsg::ExecuteSql { sql, respond_to } => {
                    let result = self.with_connection(|conn| execute_sql(conn, &sql));
                    let _ = respond_to.send(result);
                }
                SqliteMsg::ListSchemas { respond_to } => {
                    let _ = respond_to.send(self.with_connection(list_schemas));
                }
                SqliteMsg::ListTables { schema, respond_to } => {
                    let result = self.with_connection(|conn| list_tables(conn, &schema));
                    let _ = respond_to.send(result);
                }
                SqliteMsg::GetColumns {
                    schema,
                    table,
                    respond_to,
                } => {
                    let result = self.with_connection(|conn| columns(conn, &schema, &table));
                    let _ = respond_to.send(result);
                }
                SqliteMsg::GetPrimaryKeys {
                    schema,
                    table,
                    respond_to,
                } => {
                    let result = self.with_connection(|conn| primary_keys(conn, &schema, &table));
                    let _ = respond_to.send(result);
                }
                SqliteMsg::GetForeignKeys {
                    schema,
                    table,
                    respond_to,
                } => {
                    let result = self.with_connection(|conn| foreign_keys(conn, &schema, &table));
                    let _ = respond_to.send(result);
                }
                SqliteMsg::GetSchemaGrouped { schema, respond_to } => {
                    let result =
                        self.with_connection(|conn| schema_grouped(conn, schema.as_deref()));
                    let _ = respond_to.send(result);
                }
            }
        }

        debug!("SqliteActor stopped");
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        match &self.connection {
            Some(conn) => f(conn),
            None => Err(DatabaseError::NotConnected),
        }
    }

    fn connect(&mut self, config: &ConnectionConfig) -> Result<(), DatabaseError> {
        // The previous connection is gone even if the new one fails to open
        if self.connection.take().is_some() {
            info!("Replacing existing database connection");
        }
        let conn = open_connection(config).map_err(|e| DatabaseError::ConnectFailed {
            path: config.path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.connection = Some(conn);
        Ok(())
    }
}

/// Cloneable front door to the SQLite actor
#[derive(Clone)]
pub struct SqliteHandle {
    tx: mpsc::Sender<SqliteMsg>,
}

impl SqliteHandle {
    /// Spawn the actor on a dedicated thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(32);
        thread::Builder::new()
            .name("sqlite-actor".to_string())
            .spawn(move || SqliteActor::new(rx).run())?;
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SqliteMsg,
    ) -> Result<T, DatabaseError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(make(respond_to))
            .await
            .map_err(|_| DatabaseError::ActorUnavailable)?;
        rx.await.map_err(|_| DatabaseError::ActorUnavailable)?
    }

    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), DatabaseError> {
        self.request(|respond_to| SqliteMsg::Connect { config, respond_to })
            .await
    }

    pub async fn disconnect(&self) -> Result<bool, DatabaseError> {
        self.request(|respond_to| SqliteMsg::Disconnect { respond_to })
            .await
    }

    pub async fn is_connected(&self) -> bool {
        let (respond_to, rx) = oneshot::channel();
        if self
            .tx
            .send(SqliteMsg::IsConnected { respond_to })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn execute(&self, sql: &str) -> Result<ExecuteOutcome, DatabaseError> {
        let sql = sql.to_string();
        self.request(|respond_to| SqliteMsg::ExecuteSql { sql, respond_to })
            .await
    }

    pub async fn schemas(&self) -> Result<Vec<String>, DatabaseError> {
        self.request(|respond_to| SqliteMsg::ListSchemas { respond_to })
            .await
    }

    pub async fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        let schema = schema.to_string();
        self.request(|respond_to| SqliteMsg::ListTables { schema, respond_to })
            .await
    }

    pub async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.request(|respond_to| SqliteMsg::GetColumns {
            schema,
            table,
            respond_to,
        })
        .await
    }

    pub async fn primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.request(|respond_to| SqliteMsg::GetPrimaryKeys {
            schema,
            table,
            respond_to,
        })
        .await
    }

    pub async fn foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyInfo>, DatabaseError> {
        let (schema, table) = (schema.to_string(), table.to_string());
        self.request(|respond_to| SqliteMsg::GetForeignKeys {
            schema,
            table,
            respond_to,
        })
        .await
    }

    pub async fn schema_grouped(
        &self,
        schema: Option<&str>,
    ) -> Result<BTreeMap<String, TableMetadata>, DatabaseError> {
        let schema = schema.map(str::to_string);
        self.request(|respond_to| SqliteMsg::GetSchemaGrouped { schema, respond_to })
            .await
    }
}

// ============ Connection Setup ============

fn open_connection(config: &ConnectionConfig) -> Result<Connection, rusqlite::Error> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory()?
    } else {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        flags |= if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        Connection::open_with_flags(&config.path, flags)?
    };

    for attachment in &config.attachments {
        let path = attachment.path.to_string_lossy().to_string();
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_ident(&attachment.name)),
            [path],
        )?;
        debug!("Attached {} as {}", attachment.path.display(), attachment.name);
    }

    // Opening is lazy in SQLite; force a round trip so a bad file fails here
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}

// ============ Execution ============

fn execute_sql(conn: &Connection, sql: &str) -> Result<ExecuteOutcome, DatabaseError> {
    let returns_rows = match conn.prepare(sql) {
        Ok(stmt) => stmt.column_count() > 0,
        Err(rusqlite::Error::MultipleStatement) => false,
        Err(e) => return Err(e.into()),
    };

    if !returns_rows {
        conn.execute_batch(sql)?;
        let rows_affected = conn.changes() as usize;
        return Ok(ExecuteOutcome::Ack {
            message: "Statement executed successfully".to_string(),
            rows_affected,
        });
    }

    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        rows.push(row_to_object(row, &names));
    }
    Ok(ExecuteOutcome::Rows { rows })
}

fn row_to_object(row: &Row<'_>, names: &[String]) -> Map<String, Value> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let value = row.get_ref(idx).map(value_to_json).unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect()
}

/// Convert a SQLite value to JSON
fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

// ============ Introspection ============

fn list_schemas(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("PRAGMA database_list")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().filter(|name| name != "temp").collect())
}

fn list_tables(conn: &Connection, schema: &str) -> Result<Vec<String>, DatabaseError> {
    let sql = format!(
        "SELECT name FROM {}.sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(schema)
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// One row of `PRAGMA table_info`
struct PragmaColumn {
    name: String,
    data_type: String,
    not_null: bool,
    default: Option<String>,
    /// 1-based position within the primary key, 0 if not part of it
    pk_position: i64,
}

fn table_info(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<PragmaColumn>, DatabaseError> {
    let sql = format!(
        "PRAGMA {}.table_info({})",
        quote_ident(schema),
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PragmaColumn {
                name: row.get(1)?,
                data_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                not_null: row.get::<_, i64>(3)? != 0,
                default: row.get(4)?,
                pk_position: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Err(DatabaseError::UnknownTable {
            schema: schema.to_string(),
            table: table.to_string(),
        });
    }
    Ok(rows)
}

fn columns(conn: &Connection, schema: &str, table: &str) -> Result<Vec<ColumnInfo>, DatabaseError> {
    Ok(table_info(conn, schema, table)?
        .into_iter()
        .map(|col| ColumnInfo {
            nullable: !col.not_null && col.pk_position == 0,
            name: col.name,
            data_type: col.data_type,
            default: col.default,
        })
        .collect())
}

fn primary_keys(conn: &Connection, schema: &str, table: &str) -> Result<Vec<String>, DatabaseError> {
    let mut keyed: Vec<PragmaColumn> = table_info(conn, schema, table)?
        .into_iter()
        .filter(|col| col.pk_position > 0)
        .collect();
    keyed.sort_by_key(|col| col.pk_position);
    Ok(keyed.into_iter().map(|col| col.name).collect())
}

fn foreign_keys(
    conn: &Connection,
    schema: &str,
    table: &str,
) -> Result<Vec<ForeignKeyInfo>, DatabaseError> {
    // Surfaces UnknownTable; foreign_key_list is silently empty for missing tables
    table_info(conn, schema, table)?;

    let sql = format!(
        "PRAGMA {}.foreign_key_list({})",
        quote_ident(schema),
        quote_ident(table)
    );
    let mut stmt = conn.prepare(&sql)?;
    // (seq, referenced table, from column, to column)
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut keys = Vec::with_capacity(raw.len());
    for (seq, references_table, column, to) in raw {
        let references_column = match to {
            Some(to) => to,
            // `REFERENCES parent` without a column list targets the parent's primary key
            None => primary_keys(conn, schema, &references_table)
                .ok()
                .and_then(|pks| pks.into_iter().nth(seq as usize))
                .unwrap_or_default(),
        };
        keys.push(ForeignKeyInfo {
            column,
            references_schema: schema.to_string(),
            references_table,
            references_column,
        });
    }
    Ok(keys)
}

fn table_metadata(conn: &Connection, schema: &str, table: &str) -> Result<TableMetadata, DatabaseError> {
    Ok(TableMetadata {
        columns: columns(conn, schema, table)?,
        primary_keys: primary_keys(conn, schema, table)?,
        foreign_keys: foreign_keys(conn, schema, table)?,
    })
}

fn schema_grouped(
    conn: &Connection,
    schema: Option<&str>,
) -> Result<BTreeMap<String, TableMetadata>, DatabaseError> {
    let schemas = match schema {
        Some(schema) => vec![schema.to_string()],
        None => list_schemas(conn)?,
    };

    let mut grouped = BTreeMap::new();
    for schema in &schemas {
        for table in list_tables(conn, schema)? {
            match table_metadata(conn, schema, &table) {
                Ok(metadata) => {
                    grouped.insert(format!("{}.{}", schema, table), metadata);
                }
                Err(e) => warn!("Skipping {}.{} in schema description: {}", schema, table, e),
            }
        }
    }
    Ok(grouped)
}
