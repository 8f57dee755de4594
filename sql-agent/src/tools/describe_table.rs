//! Describe Table Implementation
//!
//! Cache-aware metadata lookup. A hit is served from the metadata cache; a miss
//! fetches columns, primary keys and foreign keys from the introspection
//! service and returns them. The result is stored only if no invalidation ran
//! while it was being fetched.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::{DatabaseError, SharedDatabase};
use crate::metadata_cache::{CacheLookup, SharedMetadataCache};
use crate::protocol::TableMetadata;

/// Input for describe_table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescribeTableInput {
    pub schema: String,
    pub table: String,
}

/// Where the returned metadata came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSource {
    Cache,
    Database,
}

/// Executor for describe_table
pub struct DescribeTableExecutor {
    db: SharedDatabase,
    cache: SharedMetadataCache,
}

impl DescribeTableExecutor {
    pub fn new(db: SharedDatabase, cache: SharedMetadataCache) -> Self {
        Self { db, cache }
    }

    pub async fn execute(
        &self,
        input: &DescribeTableInput,
    ) -> Result<(TableMetadata, MetadataSource), DatabaseError> {
        let (schema, table) = (input.schema.as_str(), input.table.as_str());

        let generation = match self.cache.lookup(schema, table).await {
            CacheLookup::Hit(metadata) => {
                info!("Cache hit for {}.{}", schema, table);
                return Ok((metadata, MetadataSource::Cache));
            }
            CacheLookup::Miss { generation } => generation,
        };
        info!("Cache miss for {}.{}, introspecting", schema, table);

        let metadata = TableMetadata {
            columns: self.db.columns(schema, table).await?,
            primary_keys: self.db.primary_keys(schema, table).await?,
            foreign_keys: self.db.foreign_keys(schema, table).await?,
        };
        self.cache
            .put_if_current(schema, table, metadata.clone(), generation)
            .await;
        Ok((metadata, MetadataSource::Database))
    }
}
