//! LLM Runtime - opaque text-in/text-out access to the local model.
//!
//! Two backends:
//! - `OllamaCliRuntime`: one `ollama run <model> <prompt>` process per call
//! - `OllamaHttpRuntime`: `POST /api/generate` against a running Ollama server
//!
//! Timeouts and unsuccessful runs are distinct errors. Empty output is not an
//! error; the agent treats it as a plain message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::process_utils::HideConsoleWindow;
use crate::settings::{LlmBackend, LlmSettings};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model {model} did not answer within {}s", .timeout.as_secs())]
    Timeout { model: String, timeout: Duration },
    #[error("Failed to start model process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Model process exited with {status}: {output}")]
    ProcessFailed { status: String, output: String },
    #[error("Model server request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Model server returned {status}: {body}")]
    BadStatus { status: u16, body: String },
}

impl LlmError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout { .. })
    }
}

#[async_trait]
pub trait LlmRuntime: Send + Sync {
    fn model(&self) -> &str;
    async fn run_text(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Shared reference to the configured runtime
pub type SharedLlmRuntime = Arc<dyn LlmRuntime>;

/// Build the runtime selected in settings.
pub fn runtime_from_settings(settings: &LlmSettings) -> Result<SharedLlmRuntime, LlmError> {
    let limit = Duration::from_secs(settings.timeout_secs);
    let runtime: SharedLlmRuntime = match settings.backend {
        LlmBackend::Cli => Arc::new(
            OllamaCliRuntime::new(&settings.model, limit)
                .with_command(&settings.ollama_binary, ["run"]),
        ),
        LlmBackend::Http => Arc::new(OllamaHttpRuntime::new(
            &settings.base_url,
            &settings.model,
            settings.temperature,
            limit,
        )?),
    };
    Ok(runtime)
}

// ============ CLI Backend ============

pub struct OllamaCliRuntime {
    program: String,
    base_args: Vec<String>,
    model: String,
    timeout: Duration,
}

impl OllamaCliRuntime {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "ollama".to_string(),
            base_args: vec!["run".to_string()],
            model: model.into(),
            timeout,
        }
    }

    /// Replace the executable and the arguments placed before `<model> <prompt>`.
    pub fn with_command<I, S>(mut self, program: impl Into<String>, base_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.base_args = base_args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl LlmRuntime for OllamaCliRuntime {
    fn model(&self) -> &str {
        &self.model
    }

    async fn run_text(&self, prompt: &str) -> Result<String, LlmError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg(&self.model)
            .arg(prompt)
            .kill_on_drop(true)
            .hide_console_window();

        debug!(model = %self.model, prompt_len = prompt.len(), "Spawning model process");

        // Dropping the output future on timeout kills the child
        let output = match timeout(self.timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LlmError::Timeout {
                    model: self.model.clone(),
                    timeout: self.timeout,
                })
            }
        };

        // Some models print to stderr; keep both streams
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(LlmError::ProcessFailed {
                status: output.status.to_string(),
                output: text.trim().to_string(),
            });
        }
        Ok(text)
    }
}

// ============ HTTP Backend ============

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaHttpRuntime {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaHttpRuntime {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.into(),
            temperature,
            timeout,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                model: self.model.clone(),
                timeout: self.timeout,
            }
        } else {
            LlmError::Http(e)
        }
    }
}

#[async_trait]
impl LlmRuntime for OllamaHttpRuntime {
    fn model(&self) -> &str {
        &self.model
    }

    async fn run_text(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "Requesting completion");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(parsed.response)
    }
}
