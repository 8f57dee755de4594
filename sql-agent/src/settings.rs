use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::database::ConnectionConfig;
use crate::paths;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to create config directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ LLM Settings ============

/// How the local model is reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// `ollama run <model> <prompt>` per request
    #[default]
    Cli,
    /// Ollama HTTP API
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    pub ollama_binary: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Cli,
            model: "deepseek-r1".to_string(),
            ollama_binary: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: 60,
            temperature: 0.2,
        }
    }
}

// ============ Agent Settings ============

/// Limits and policies of the agent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_steps: usize,
    /// Consecutive identical tool calls tolerated before the run is stopped
    pub stuck_loop_threshold: usize,
    /// Number of most recent turns rendered into the prompt
    pub history_window: usize,
    pub sample_rows_default: usize,
    pub sample_rows_max: usize,
    /// Treat a bare `{"sql": ...}` object without a FINAL_SQL marker as an answer
    pub accept_bare_final_answer: bool,
    /// Replaces the built-in policy prompt when set
    pub policy_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            stuck_loop_threshold: 3,
            history_window: 20,
            sample_rows_default: 5,
            sample_rows_max: 100,
            accept_bare_final_answer: true,
            policy_prompt: None,
        }
    }
}

// ============ App Settings ============

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// JSON file replacing the built-in tool catalog
    #[serde(default)]
    pub tool_catalog_path: Option<PathBuf>,
    /// Database opened at startup
    #[serde(default)]
    pub default_database: Option<ConnectionConfig>,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl AppSettings {
    /// Raise limits that would stop every run immediately to their minimum of 1.
    pub fn clamp_limits(&mut self) {
        self.llm.timeout_secs = self.llm.timeout_secs.max(1);
        self.agent.max_steps = self.agent.max_steps.max(1);
        self.agent.stuck_loop_threshold = self.agent.stuck_loop_threshold.max(1);
        self.agent.sample_rows_max = self.agent.sample_rows_max.max(1);
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            agent: AgentSettings::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
            tool_catalog_path: None,
            default_database: None,
        }
    }
}

/// Load settings from `path`, falling back to defaults when the file is
/// missing or unparseable.
pub async fn load_settings_from(path: &Path) -> AppSettings {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(mut settings) => {
                info!("Settings loaded from {:?}", path);
                settings.clamp_limits();
                settings
            }
            Err(e) => {
                warn!("Failed to parse settings {:?}: {}, using defaults", path, e);
                AppSettings::default()
            }
        },
        Err(e) => {
            info!("No config file at {:?} ({}), using defaults", path, e);
            AppSettings::default()
        }
    }
}

/// Load settings from the platform config file
pub async fn load_settings() -> AppSettings {
    load_settings_from(&paths::get_settings_path()).await
}

/// Save settings as pretty JSON to `path`, creating its directory.
pub async fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| SettingsError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    fs::write(path, contents)
        .await
        .map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })?;

    info!("Settings saved to {:?}", path);
    Ok(())
}

/// Save settings to the platform config file, using a fallback directory if
/// the standard one is not writable.
pub async fn save_settings(settings: &AppSettings) -> Result<PathBuf, SettingsError> {
    let primary = paths::get_config_dir();
    let dir = paths::ensure_writable_dir(primary.clone(), "config")
        .await
        .unwrap_or(primary);
    let path = dir.join(paths::SETTINGS_FILE);
    save_settings_to(settings, &path).await?;
    Ok(path)
}
