//! Metadata Cache - TTL store of per-table structural metadata.
//!
//! Keyed by `(schema, table)`. Entries are evicted lazily: an entry whose age
//! has reached the TTL is removed on the next `get` and reported as a miss.
//! There is no background sweep. A miss always sends the caller back to the
//! authoritative introspection service.
//!
//! The cache is shared process-wide by every agent run and by the schema change
//! monitor, so all access goes through an async `RwLock`. Every invalidation
//! bumps a generation counter; a miss reports the generation it saw and
//! `put_if_current` refuses to store metadata fetched before a later
//! invalidation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::protocol::TableMetadata;

/// Default time-to-live for cached metadata
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

// ============ Clock ============

/// Source of monotonic time for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for simulating TTL expiry.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

// ============ Cache ============

#[derive(Debug, Clone)]
struct CacheEntry {
    metadata: TableMetadata,
    created: Instant,
    cached_at: DateTime<Utc>,
}

/// One live key in a cache status snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatusEntry {
    pub schema: String,
    pub table: String,
    pub cached_at: DateTime<Utc>,
    pub remaining_ttl_secs: u64,
}

/// Observability snapshot of the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub ttl_secs: u64,
    pub entries: Vec<CacheStatusEntry>,
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(TableMetadata),
    /// Nothing usable is cached; `generation` is the invalidation count at lookup time
    Miss { generation: u64 },
}

/// Shared reference to the metadata cache
pub type SharedMetadataCache = Arc<MetadataCache>;

pub struct MetadataCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    /// schema -> table -> entry
    entries: RwLock<HashMap<String, HashMap<String, CacheEntry>>>,
    /// Incremented under the write lock by every invalidation
    generation: AtomicU64,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created) >= self.ttl
    }

    /// Look up metadata, evicting the entry if its TTL has elapsed.
    pub async fn get(&self, schema: &str, table: &str) -> Option<TableMetadata> {
        match self.lookup(schema, table).await {
            CacheLookup::Hit(metadata) => Some(metadata),
            CacheLookup::Miss { .. } => None,
        }
    }

    /// Like `get`, but a miss carries the generation to pass to `put_if_current`.
    pub async fn lookup(&self, schema: &str, table: &str) -> CacheLookup {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            let generation = self.generation.load(Ordering::SeqCst);
            match entries.get(schema).and_then(|tables| tables.get(table)) {
                None => return CacheLookup::Miss { generation },
                Some(entry) if !self.is_expired(entry, now) => {
                    return CacheLookup::Hit(entry.metadata.clone())
                }
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock since a concurrent put may have refreshed it
        let mut entries = self.entries.write().await;
        let generation = self.generation.load(Ordering::SeqCst);
        let Some(tables) = entries.get_mut(schema) else {
            return CacheLookup::Miss { generation };
        };
        let expired = match tables.get(table) {
            Some(entry) => self.is_expired(entry, now),
            None => return CacheLookup::Miss { generation },
        };
        if !expired {
            if let Some(entry) = tables.get(table) {
                return CacheLookup::Hit(entry.metadata.clone());
            }
        }

        tables.remove(table);
        if tables.is_empty() {
            entries.remove(schema);
        }
        debug!(schema, table, "metadata cache entry expired");
        CacheLookup::Miss { generation }
    }

    fn new_entry(&self, metadata: TableMetadata) -> CacheEntry {
        CacheEntry {
            metadata,
            created: self.clock.now(),
            cached_at: Utc::now(),
        }
    }

    /// Insert or replace metadata, resetting its timestamp.
    pub async fn put(&self, schema: &str, table: &str, metadata: TableMetadata) {
        let entry = self.new_entry(metadata);
        let mut entries = self.entries.write().await;
        entries
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), entry);
    }

    /// Store metadata fetched after a miss, unless an invalidation happened
    /// since that miss. Returns whether it was stored.
    pub async fn put_if_current(
        &self,
        schema: &str,
        table: &str,
        metadata: TableMetadata,
        generation: u64,
    ) -> bool {
        let entry = self.new_entry(metadata);
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(schema, table, "metadata changed during lookup, not caching");
            return false;
        }
        entries
            .entry(schema.to_string())
            .or_default()
            .insert(table.to_string(), entry);
        true
    }

    /// Remove one table. Returns whether anything was removed.
    pub async fn invalidate_table(&self, schema: &str, table: &str) -> bool {
        let mut entries = self.entries.write().await;
        self.bump_generation();
        let Some(tables) = entries.get_mut(schema) else {
            return false;
        };
        let removed = tables.remove(table).is_some();
        if tables.is_empty() {
            entries.remove(schema);
        }
        removed
    }

    /// Remove every table of one schema. Returns the number of removed entries.
    pub async fn invalidate_schema(&self, schema: &str) -> usize {
        let mut entries = self.entries.write().await;
        self.bump_generation();
        entries.remove(schema).map(|tables| tables.len()).unwrap_or(0)
    }

    /// Remove `table` from every schema holding it. Returns the affected schemas.
    pub async fn invalidate_table_everywhere(&self, table: &str) -> Vec<String> {
        let mut entries = self.entries.write().await;
        self.bump_generation();
        let mut affected: Vec<String> = Vec::new();
        for (schema, tables) in entries.iter_mut() {
            if tables.remove(table).is_some() {
                affected.push(schema.clone());
            }
        }
        entries.retain(|_, tables| !tables.is_empty());
        affected.sort();
        affected
    }

    /// Clear the entire cache. Returns the number of removed entries.
    pub async fn invalidate_all(&self) -> usize {
        let mut entries = self.entries.write().await;
        self.bump_generation();
        let count = entries.values().map(|tables| tables.len()).sum();
        entries.clear();
        count
    }

    /// Snapshot of all live keys with their remaining TTL. Does not evict.
    pub async fn status(&self) -> CacheStatus {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        let mut live: Vec<CacheStatusEntry> = entries
            .iter()
            .flat_map(|(schema, tables)| {
                tables.iter().filter_map(move |(table, entry)| {
                    let age = now.saturating_duration_since(entry.created);
                    if age >= self.ttl {
                        return None;
                    }
                    Some(CacheStatusEntry {
                        schema: schema.clone(),
                        table: table.clone(),
                        cached_at: entry.cached_at,
                        remaining_ttl_secs: (self.ttl - age).as_secs(),
                    })
                })
            })
            .collect();
        live.sort_by(|a, b| (&a.schema, &a.table).cmp(&(&b.schema, &b.table)));

        CacheStatus {
            ttl_secs: self.ttl.as_secs(),
            entries: live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ColumnInfo;

    fn metadata(column: &str) -> TableMetadata {
        TableMetadata {
            columns: vec![ColumnInfo {
                name: column.to_string(),
                data_type: "INTEGER".to_string(),
                nullable: false,
                default: None,
            }],
            primary_keys: vec![column.to_string()],
            foreign_keys: vec![],
        }
    }

    fn cache_with_clock() -> (MetadataCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = MetadataCache::with_clock(Duration::from_secs(60), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_get_after_put_returns_metadata() {
        let (cache, _clock) = cache_with_clock();
        for (schema, table) in [("public", "orders"), ("sales", "orders"), ("public", "users")] {
            cache.put(schema, table, metadata(table)).await;
            assert_eq!(cache.get(schema, table).await, Some(metadata(table)));
        }
    }

    #[tokio::test]
    async fn test_entry_expires_at_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.put("public", "orders", metadata("id")).await;

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("public", "orders").await.is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("public", "orders").await.is_none());
        assert!(cache.status().await.entries.is_empty());
    }

    #[tokio::test]
    async fn test_put_resets_timestamp() {
        let (cache, clock) = cache_with_clock();
        cache.put("public", "orders", metadata("id")).await;
        clock.advance(Duration::from_secs(50));
        cache.put("public", "orders", metadata("order_id")).await;
        clock.advance(Duration::from_secs(50));
        assert_eq!(cache.get("public", "orders").await, Some(metadata("order_id")));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let (cache, _clock) = cache_with_clock();
        cache.put("public", "orders", metadata("id")).await;
        cache.put("sales", "leads", metadata("id")).await;

        assert_eq!(cache.invalidate_all().await, 2);
        assert!(cache.get("public", "orders").await.is_none());
        assert!(cache.get("sales", "leads").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_schema_and_table() {
        let (cache, _clock) = cache_with_clock();
        cache.put("public", "orders", metadata("id")).await;
        cache.put("public", "users", metadata("id")).await;
        cache.put("sales", "orders", metadata("id")).await;

        assert!(cache.invalidate_table("public", "users").await);
        assert!(!cache.invalidate_table("public", "users").await);
        assert_eq!(cache.invalidate_schema("sales").await, 1);

        assert!(cache.get("public", "orders").await.is_some());
        assert!(cache.get("sales", "orders").await.is_none());
    }

    #[tokio::test]
    async fn test_store_after_invalidation_is_dropped() {
        let (cache, _clock) = cache_with_clock();
        let CacheLookup::Miss { generation } = cache.lookup("public", "orders").await else {
            panic!("expected a miss");
        };

        cache.invalidate_table("public", "orders").await;
        assert!(!cache.put_if_current("public", "orders", metadata("id"), generation).await);
        assert!(cache.get("public", "orders").await.is_none());

        let CacheLookup::Miss { generation } = cache.lookup("public", "orders").await else {
            panic!("expected a miss");
        };
        assert!(cache.put_if_current("public", "orders", metadata("id"), generation).await);
        assert_eq!(
            cache.lookup("public", "orders").await,
            CacheLookup::Hit(metadata("id"))
        );
    }

    #[tokio::test]
    async fn test_invalidate_table_everywhere() {
        let (cache, _clock) = cache_with_clock();
        cache.put("public", "orders", metadata("id")).await;
        cache.put("sales", "orders", metadata("id")).await;
        cache.put("sales", "leads", metadata("id")).await;

        let affected = cache.invalidate_table_everywhere("orders").await;
        assert_eq!(affected, vec!["public".to_string(), "sales".to_string()]);
        assert!(cache.get("sales", "leads").await.is_some());
    }

    #[tokio::test]
    async fn test_status_reports_remaining_ttl_sorted() {
        let (cache, clock) = cache_with_clock();
        cache.put("sales", "leads", metadata("id")).await;
        cache.put("public", "orders", metadata("id")).await;
        clock.advance(Duration::from_secs(20));

        let status = cache.status().await;
        assert_eq!(status.ttl_secs, 60);
        let keys: Vec<(&str, &str)> = status
            .entries
            .iter()
            .map(|e| (e.schema.as_str(), e.table.as_str()))
            .collect();
        assert_eq!(keys, vec![("public", "orders"), ("sales", "leads")]);
        assert_eq!(status.entries[0].remaining_ttl_secs, 40);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(MetadataCache::new(DEFAULT_CACHE_TTL));
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let table = format!("t{}", i % 4);
                cache.put("public", &table, metadata("id")).await;
                let _ = cache.get("public", &table).await;
                if i % 5 == 0 {
                    cache.invalidate_table("public", &table).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.status().await.entries.len() <= 4);
    }
}
