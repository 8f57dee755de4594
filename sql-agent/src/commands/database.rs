//! Connection and schema commands for the operator.

use serde_json::{json, Value};
use tracing::info;

use crate::app_state::AppContext;
use crate::cli::parse_attachment;
use crate::database::ConnectionConfig;

/// `:connect <path> [name=path ...]`
pub async fn connect(ctx: &AppContext, args: &[&str]) -> Result<Value, String> {
    let (path, rest) = args
        .split_first()
        .ok_or_else(|| "Usage: :connect <path> [name=path ...]".to_string())?;

    let mut config = ConnectionConfig::new(*path);
    for raw in rest {
        config.attachments.push(parse_attachment(raw)?);
    }

    ctx.db.connect(config).await.map_err(|e| e.to_string())?;
    let schemas = ctx.db.schemas().await.map_err(|e| e.to_string())?;
    info!("Operator connected to {}", path);
    Ok(json!({ "connected": path, "schemas": schemas }))
}

/// `:disconnect`
pub async fn disconnect(ctx: &AppContext) -> Result<Value, String> {
    let closed = ctx.db.disconnect().await.map_err(|e| e.to_string())?;
    Ok(json!({ "disconnected": closed }))
}

/// `:exec <sql>`. Operator-only; the agent never reaches this path.
pub async fn exec_sql(ctx: &AppContext, sql: &str) -> Result<Value, String> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err("Usage: :exec <sql>".to_string());
    }
    let outcome = ctx.db.execute(sql).await.map_err(|e| e.to_string())?;
    serde_json::to_value(outcome).map_err(|e| e.to_string())
}

/// `:schema [schema]`
pub async fn describe_schema(ctx: &AppContext, schema: Option<&str>) -> Result<Value, String> {
    let schema = schema.map(|s| s.trim().to_lowercase());
    let grouped = ctx
        .db
        .schema_grouped(schema.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(grouped).map_err(|e| e.to_string())
}
