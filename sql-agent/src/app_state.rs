//! Process-scoped application state.
//!
//! `AppContext` is built once at startup and passed explicitly to every
//! command. It owns the shared collaborators: the database handle, the
//! metadata cache and its change monitor, the LLM runtime and the tool
//! catalog. Per-run state lives in `ConversationState` instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use crate::actors::SqliteHandle;
use crate::agentic_loop::{AgentConfig, AgentContext};
use crate::database::{DatabaseService, SharedDatabase};
use crate::llm_runtime::{runtime_from_settings, SharedLlmRuntime};
use crate::metadata_cache::{MetadataCache, SharedMetadataCache};
use crate::schema_monitor::SchemaChangeMonitor;
use crate::settings::AppSettings;
use crate::tool_execution::ToolDispatcher;
use crate::tool_registry::{SharedToolCatalog, ToolCatalog};

pub struct AppContext {
    pub db: SharedDatabase,
    pub cache: SharedMetadataCache,
    pub llm: SharedLlmRuntime,
    pub catalog: SharedToolCatalog,
    pub agent: AgentContext,
    pub settings: AppSettings,
}

impl AppContext {
    /// Wire everything from settings. Connects to the default database if
    /// one is configured; a failed connect is logged, not fatal.
    pub async fn from_settings(settings: AppSettings) -> anyhow::Result<Self> {
        let cache: SharedMetadataCache =
            Arc::new(MetadataCache::new(Duration::from_secs(settings.cache_ttl_secs)));
        let monitor = Arc::new(SchemaChangeMonitor::new(cache.clone()));
        let sqlite = SqliteHandle::spawn().context("Failed to start the SQLite actor")?;
        let db: SharedDatabase = Arc::new(DatabaseService::new(sqlite, monitor));

        let llm = runtime_from_settings(&settings.llm).context("Failed to set up the LLM runtime")?;
        let catalog: SharedToolCatalog = Arc::new(
            ToolCatalog::load(settings.tool_catalog_path.as_deref())
                .await
                .context("Failed to load the tool catalog")?,
        );

        let ctx = Self::assemble(db, cache, llm, catalog, settings);

        if let Some(config) = ctx.settings.default_database.clone() {
            let path = config.path.display().to_string();
            match ctx.db.connect(config).await {
                Ok(()) => info!("Connected to default database {}", path),
                Err(e) => warn!("Default database unavailable: {}", e),
            }
        }

        Ok(ctx)
    }

    /// Build a context from already constructed collaborators.
    pub fn assemble(
        db: SharedDatabase,
        cache: SharedMetadataCache,
        llm: SharedLlmRuntime,
        catalog: SharedToolCatalog,
        settings: AppSettings,
    ) -> Self {
        let dispatcher = Arc::new(ToolDispatcher::new(
            db.clone(),
            cache.clone(),
            settings.agent.sample_rows_default,
            settings.agent.sample_rows_max,
        ));
        let agent = AgentContext {
            llm: llm.clone(),
            catalog: catalog.clone(),
            dispatcher,
            config: AgentConfig::from_settings(&settings.agent),
        };
        info!(
            model = llm.model(),
            tools = catalog.tools().len(),
            max_steps = agent.config.max_steps,
            "Application context ready"
        );

        Self {
            db,
            cache,
            llm,
            catalog,
            agent,
            settings,
        }
    }
}
