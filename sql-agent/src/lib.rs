pub mod actors;
pub mod agentic_loop;
pub mod agentic_state;
pub mod app_state;
pub mod cli;
pub mod commands;
pub mod database;
pub mod llm_runtime;
pub mod metadata_cache;
pub mod paths;
pub mod process_utils;
pub mod protocol;
pub mod repetition_detector;
pub mod schema_monitor;
pub mod settings;
pub mod state_machine;
pub mod system_prompt;
pub mod tool_execution;
pub mod tool_parsing;
pub mod tool_registry;
pub mod tools;

#[cfg(test)]
mod tests;

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use app_state::AppContext;
use cli::{apply_cli_overrides, CliArgs};
use commands::{ShellOutcome, HELP_TEXT};

const SHELL_PROMPT: &str = "sql> ";

/// Logs go to stderr so stdout carries only command output.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show_prompt() {
    print!("{}", SHELL_PROMPT);
    let _ = std::io::stdout().flush();
}

async fn run_shell(ctx: &AppContext) -> anyhow::Result<()> {
    println!("{}", HELP_TEXT);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    show_prompt();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match commands::handle_line(ctx, &line).await {
            ShellOutcome::Print(value) => print_json(&value)?,
            ShellOutcome::Text(text) => println!("{}", text),
            ShellOutcome::Nothing => {}
            ShellOutcome::Quit => break,
        }
        show_prompt();
    }

    info!("Shell closed");
    Ok(())
}

async fn run_async(args: CliArgs) -> anyhow::Result<()> {
    let mut settings = match &args.settings {
        Some(path) => settings::load_settings_from(path).await,
        None => settings::load_settings().await,
    };

    if args.init_config {
        let path = match &args.settings {
            Some(path) => {
                settings::save_settings_to(&settings, path).await?;
                path.clone()
            }
            None => settings::save_settings(&settings).await?,
        };
        println!("{}", path.display());
        return Ok(());
    }

    let launch = apply_cli_overrides(&args, &mut settings);
    let ctx = AppContext::from_settings(settings).await?;

    match launch.initial_prompt {
        Some(prompt) => print_json(&commands::chat(&ctx, &prompt).await),
        None => run_shell(&ctx).await,
    }
}

/// Binary entry point: parse arguments, install logging, run the shell or a
/// single request.
pub fn run() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")?;
    runtime.block_on(run_async(args))
}
