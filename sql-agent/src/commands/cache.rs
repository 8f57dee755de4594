//! Metadata cache administration commands.

use serde_json::{json, Value};

use crate::app_state::AppContext;

/// `:cache`
pub async fn cache_status(ctx: &AppContext) -> Result<Value, String> {
    serde_json::to_value(ctx.cache.status().await).map_err(|e| e.to_string())
}

/// `:invalidate [schema[.table]]`. No target clears everything.
pub async fn invalidate(ctx: &AppContext, target: Option<&str>) -> Result<Value, String> {
    let target = target.map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty());

    let removed = match target.as_deref() {
        None => ctx.cache.invalidate_all().await,
        Some(target) => match target.split_once('.') {
            Some((schema, table)) => {
                usize::from(ctx.cache.invalidate_table(schema.trim(), table.trim()).await)
            }
            None => ctx.cache.invalidate_schema(target).await,
        },
    };

    Ok(json!({ "invalidated": removed }))
}
