//! Drain commands: a single pass, or a long-running coordinator.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use super::AppContext;
use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::output::{format_drain_event_pretty, format_drain_outcome};
use crate::sync::{CoordinatorConfig, CoordinatorHandle, DrainEvent, NetworkStatus, TriggerCoordinator};

/// Run one drain pass.
///
/// # Errors
///
/// Returns an error if the API URL is invalid or output formatting fails.
pub async fn run(ctx: &AppContext, offline: bool) -> Result<String, SyncError> {
    let store = ctx.open_store();
    let network = NetworkStatus::new(!offline);
    let executor = ctx.executor(store, Arc::new(network))?;

    let outcome = executor.process_sync_queue().await;
    format_drain_outcome(&outcome, ctx.format)
}

/// A host event typed on stdin during `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    Online,
    Offline,
    Visible,
    Hidden,
    Message(String),
}

impl FromStr for WatchInput {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match word.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "visible" => Ok(Self::Visible),
            "hidden" => Ok(Self::Hidden),
            "message" if !rest.trim().is_empty() => Ok(Self::Message(rest.trim().to_string())),
            "message" => Err(SyncError::InvalidInput("message needs a tag".to_string())),
            _ => Err(SyncError::InvalidInput(format!(
                "Unknown input '{line}' (expected online, offline, visible, hidden or message <tag>)"
            ))),
        }
    }
}

/// Run the trigger coordinator until Ctrl-C, printing every drain.
///
/// # Errors
///
/// Returns an error if the API URL is invalid.
pub async fn watch(ctx: &AppContext) -> Result<String, SyncError> {
    let store = ctx.open_store();
    let network = NetworkStatus::default();
    let executor = Arc::new(ctx.executor(store, Arc::new(network.clone()))?);

    let coordinator = TriggerCoordinator::new(executor, CoordinatorConfig::from(&ctx.config.sync))
        .with_network(network);
    let mut events = coordinator.subscribe();
    let handle = coordinator.start();

    if ctx.format == OutputFormat::Pretty {
        eprintln!(
            "{}",
            format!(
                "Watching {} (Ctrl-C to stop)",
                ctx.config.sync.api_base_url
            )
            .dimmed()
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => forward_input(&handle, &line).await,
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin closed");
                        stdin_open = false;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => print_event(&event, ctx.format),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "dropped drain events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    handle.shutdown().await;
    Ok(String::new())
}

async fn forward_input(handle: &CoordinatorHandle, line: &str) {
    let result = match line.parse::<WatchInput>() {
        Ok(WatchInput::Online) => handle.set_online(true).await,
        Ok(WatchInput::Offline) => handle.set_online(false).await,
        Ok(WatchInput::Visible) => handle.set_visible(true).await,
        Ok(WatchInput::Hidden) => handle.set_visible(false).await,
        Ok(WatchInput::Message(tag)) => handle.post_message(tag).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{}: {e}", "warning".yellow().bold());
    }
}

fn print_event(event: &DrainEvent, format: OutputFormat) {
    match format {
        OutputFormat::Pretty => println!("{}", format_drain_event_pretty(event, Utc::now())),
        OutputFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode drain event"),
        },
    }
}
