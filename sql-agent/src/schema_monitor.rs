//! Schema Change Monitor - keeps the metadata cache honest after DDL.
//!
//! Every statement executed on the active connection is passed through
//! `on_executed`. DDL touching tables or views invalidates the matching cache
//! entries. When the affected object cannot be determined the whole cache is
//! dropped; an unqualified table name is removed from every schema that holds it.
//!
//! Replacing or closing the connection drops the whole cache: SQLite names the
//! main database `main` whatever file is open.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use crate::metadata_cache::SharedMetadataCache;

lazy_static! {
    static ref SCHEMA_CHANGE_RE: Regex =
        Regex::new(r"(?i)\b(ALTER|CREATE|DROP)\b\s+\b(TABLE|VIEW|INDEX|SCHEMA)\b").unwrap();
    static ref AFFECTED_OBJECT_RE: Regex = Regex::new(
        r#"(?i)\b(ALTER|CREATE|DROP)\s+(TABLE|VIEW)\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?[`"\[]?(\w+)[`"\]]?(?:\s*\.\s*[`"\[]?(\w+)[`"\]]?)?"#
    )
    .unwrap();
    static ref OBJECT_NAME_RE: Regex = Regex::new(
        r#"(?i)\b(ALTER|CREATE|DROP)\s+(TABLE|VIEW|INDEX|SCHEMA)\s+(?:IF\s+(?:NOT\s+)?EXISTS\s+)?[`"\[]?(\w+)[`"\]]?(?:\s*\.\s*[`"\[]?(\w+)[`"\]]?)?"#
    )
    .unwrap();
}

/// DDL verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DdlVerb {
    Create,
    Alter,
    Drop,
}

impl DdlVerb {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "CREATE" => Some(DdlVerb::Create),
            "ALTER" => Some(DdlVerb::Alter),
            "DROP" => Some(DdlVerb::Drop),
            _ => None,
        }
    }
}

/// Kind of object a DDL statement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Table,
    View,
    Index,
    Schema,
}

impl ObjectKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "TABLE" => Some(ObjectKind::Table),
            "VIEW" => Some(ObjectKind::View),
            "INDEX" => Some(ObjectKind::Index),
            "SCHEMA" => Some(ObjectKind::Schema),
            _ => None,
        }
    }
}

/// A structural change detected in executed SQL. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaChangeEvent {
    pub verb: DdlVerb,
    pub kind: ObjectKind,
    pub schema: Option<String>,
    pub name: String,
}

/// Split an optionally qualified name capture into (schema, name), lowercased.
fn qualified_name(first: &str, second: Option<&str>) -> (Option<String>, String) {
    match second {
        Some(name) => (Some(first.to_lowercase()), name.to_lowercase()),
        None => (None, first.to_lowercase()),
    }
}

/// Whether `sql` contains DDL on a table, view, index or schema.
pub fn is_schema_change(sql: &str) -> bool {
    SCHEMA_CHANGE_RE.is_match(sql)
}

/// Every DDL change found in `sql`, in statement order.
pub fn detect_changes(sql: &str) -> Vec<SchemaChangeEvent> {
    OBJECT_NAME_RE
        .captures_iter(sql)
        .filter_map(|cap| {
            let verb = DdlVerb::parse(cap.get(1)?.as_str())?;
            let kind = ObjectKind::parse(cap.get(2)?.as_str())?;
            let (schema, name) =
                qualified_name(cap.get(3)?.as_str(), cap.get(4).map(|m| m.as_str()));
            Some(SchemaChangeEvent {
                verb,
                kind,
                schema,
                name,
            })
        })
        .collect()
}

/// Tables and views affected by DDL in `sql`, as `(schema, table)` pairs.
pub fn extract_objects(sql: &str) -> Vec<(Option<String>, String)> {
    AFFECTED_OBJECT_RE
        .captures_iter(sql)
        .filter_map(|cap| {
            let first = cap.get(3)?.as_str();
            Some(qualified_name(first, cap.get(4).map(|m| m.as_str())))
        })
        .collect()
}

/// Invalidates cache entries affected by executed SQL.
pub struct SchemaChangeMonitor {
    cache: SharedMetadataCache,
}

impl SchemaChangeMonitor {
    pub fn new(cache: SharedMetadataCache) -> Self {
        Self { cache }
    }

    /// The active connection was opened, replaced or closed.
    pub async fn on_connection_changed(&self) {
        let removed = self.cache.invalidate_all().await;
        info!(removed, "Connection changed, invalidated entire metadata cache");
    }

    /// Process a statement that was just executed.
    pub async fn on_executed(&self, sql: &str) {
        if !is_schema_change(sql) {
            return;
        }
        for event in detect_changes(sql) {
            info!(
                verb = ?event.verb,
                kind = ?event.kind,
                schema = event.schema.as_deref().unwrap_or("-"),
                name = %event.name,
                "Schema change detected"
            );
        }

        let affected = extract_objects(sql);
        if affected.is_empty() {
            let removed = self.cache.invalidate_all().await;
            info!(
                removed,
                "Schema change detected, invalidated entire metadata cache"
            );
            return;
        }

        for (schema, table) in affected {
            match schema {
                Some(schema) => {
                    self.cache.invalidate_table(&schema, &table).await;
                    info!("Invalidated cache for {}.{}", schema, table);
                }
                None => {
                    for schema in self.cache.invalidate_table_everywhere(&table).await {
                        info!("Invalidated cache for {}.{}", schema, table);
                    }
                }
            }
        }
    }
}
