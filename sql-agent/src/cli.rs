//! Command-line argument parsing and launch configuration.
//!
//! This module handles CLI argument parsing using clap, and applies
//! launch-time overrides to application settings. Overrides are never
//! persisted.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::warn;

use crate::database::{AttachedDatabase, ConnectionConfig};
use crate::settings::{AppSettings, LlmBackend};

/// CLI arguments for sql-agent
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "sql-agent",
    about = "Schema-grounded SQL generation with a local LLM"
)]
pub struct CliArgs {
    /// Settings file to load instead of the platform default
    #[arg(long, value_name = "PATH", env = "SQL_AGENT_SETTINGS")]
    pub settings: Option<PathBuf>,
    /// Model name passed to Ollama
    #[arg(long, value_name = "MODEL", env = "SQL_AGENT_MODEL")]
    pub model: Option<String>,
    /// How to reach the model
    #[arg(long, value_enum, env = "SQL_AGENT_BACKEND")]
    pub backend: Option<LlmBackend>,
    /// Ollama executable for the cli backend
    #[arg(long, value_name = "PATH", env = "SQL_AGENT_OLLAMA_BINARY")]
    pub ollama_binary: Option<String>,
    /// Ollama server for the http backend
    #[arg(long, value_name = "URL", env = "SQL_AGENT_BASE_URL")]
    pub base_url: Option<String>,
    /// Seconds to wait for one model reply
    #[arg(long, value_name = "SECS", env = "SQL_AGENT_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
    /// Model invocations allowed per request
    #[arg(long, value_name = "INT", env = "SQL_AGENT_MAX_STEPS")]
    pub max_steps: Option<usize>,
    /// Identical tool calls tolerated in a row
    #[arg(long, value_name = "INT", env = "SQL_AGENT_STUCK_LOOP_THRESHOLD")]
    pub stuck_loop_threshold: Option<usize>,
    /// Metadata cache time to live
    #[arg(long, value_name = "SECS", env = "SQL_AGENT_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,
    /// Replace the policy prompt (string or @path/to/file)
    #[arg(long, value_name = "PROMPT_OR_@FILE", env = "SQL_AGENT_POLICY")]
    pub policy: Option<String>,
    /// JSON tool catalog replacing the built-in one
    #[arg(long, value_name = "PATH", env = "SQL_AGENT_TOOL_CATALOG")]
    pub tool_catalog: Option<PathBuf>,
    /// SQLite database to connect to on start
    #[arg(long, value_name = "PATH", env = "SQL_AGENT_DATABASE")]
    pub database: Option<PathBuf>,
    /// Extra databases to attach (name=path), comma-separated
    #[arg(long, value_delimiter = ',', value_name = "NAME=PATH", env = "SQL_AGENT_ATTACH")]
    pub attach: Vec<String>,
    /// Open the database read-only
    #[arg(long, env = "SQL_AGENT_READ_ONLY")]
    pub read_only: bool,
    /// Write the loaded settings (without launch overrides) to the config file and exit
    #[arg(long)]
    pub init_config: bool,
    /// Run a single request and exit (string or @path/to/file)
    #[arg(long, value_name = "PROMPT_OR_@FILE", env = "SQL_AGENT_PROMPT")]
    pub prompt: Option<String>,
}

/// Launch-only values that are not settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOverrides {
    pub initial_prompt: Option<String>,
}

/// Read a value that may be either a literal string or a @path reference to a file
pub fn read_value_or_file(raw: &str) -> Result<String, String> {
    if let Some(path) = raw.strip_prefix('@') {
        let contents = fs::read_to_string(Path::new(path))
            .map_err(|e| format!("Failed to read {}: {}", path, e))?;
        Ok(contents)
    } else {
        Ok(raw.to_string())
    }
}

/// Parse a `name=path` attachment argument
pub fn parse_attachment(raw: &str) -> Result<AttachedDatabase, String> {
    let (name, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected name=path, got '{}'", raw))?;
    let name = name.trim().to_lowercase();
    let path = path.trim();
    if name.is_empty() || path.is_empty() {
        return Err(format!("Expected name=path, got '{}'", raw));
    }
    Ok(AttachedDatabase {
        name,
        path: PathBuf::from(path),
    })
}

/// Apply CLI overrides to settings without persisting them.
pub fn apply_cli_overrides(args: &CliArgs, settings: &mut AppSettings) -> LaunchOverrides {
    if let Some(model) = &args.model {
        settings.llm.model = model.clone();
    }
    if let Some(backend) = args.backend {
        settings.llm.backend = backend;
    }
    if let Some(binary) = &args.ollama_binary {
        settings.llm.ollama_binary = binary.clone();
    }
    if let Some(url) = &args.base_url {
        settings.llm.base_url = url.clone();
    }
    if let Some(secs) = args.timeout_secs {
        settings.llm.timeout_secs = secs.max(1);
    }
    if let Some(steps) = args.max_steps {
        settings.agent.max_steps = steps.max(1);
    }
    if let Some(threshold) = args.stuck_loop_threshold {
        settings.agent.stuck_loop_threshold = threshold.max(1);
    }
    if let Some(ttl) = args.cache_ttl_secs {
        settings.cache_ttl_secs = ttl;
    }
    if let Some(raw) = &args.policy {
        match read_value_or_file(raw) {
            Ok(policy) => settings.agent.policy_prompt = Some(policy),
            Err(e) => warn!("Failed to apply policy override: {}", e),
        }
    }
    if let Some(path) = &args.tool_catalog {
        settings.tool_catalog_path = Some(path.clone());
    }

    if let Some(path) = &args.database {
        let mut config = ConnectionConfig::new(path.clone());
        config.read_only = args.read_only;
        for raw in &args.attach {
            match parse_attachment(raw) {
                Ok(attachment) => config.attachments.push(attachment),
                Err(e) => warn!("Ignoring --attach: {}", e),
            }
        }
        settings.default_database = Some(config);
    } else if !args.attach.is_empty() {
        warn!("--attach has no effect without --database");
    }

    let initial_prompt = args.prompt.as_deref().and_then(|raw| {
        read_value_or_file(raw)
            .map_err(|e| warn!("Failed to read --prompt: {}", e))
            .ok()
    });

    LaunchOverrides { initial_prompt }
}
