//! Command implementations for planner-sync.
//!
//! Commands return their rendered output; `main` prints it.

mod config;
mod conflicts;
mod queue;
mod sync;

pub use config::config;
pub use conflicts::conflicts;
pub use queue::{enqueue, list, retry, status};
pub use sync::{run, watch, WatchInput};

use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::{Cli, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::sync::{Backoff, ConnectivityProbe, HttpTransport, SyncExecutor, SyncStore};

/// Resolved paths, configuration and output format for one invocation.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
}

impl AppContext {
    /// Resolve the data root, load the config file and apply CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the data root cannot be determined or the config
    /// file cannot be parsed.
    pub fn from_cli(cli: &Cli) -> Result<Self, SyncError> {
        let paths = match &cli.home {
            Some(root) => Paths::with_root(root.clone()),
            None => Paths::new()?,
        };

        let mut config = Config::load(&paths)?;
        if let Some(url) = &cli.api_url {
            config.sync.api_base_url.clone_from(url);
        }

        let format = cli.output.unwrap_or(config.general.default_output);

        Ok(Self {
            paths,
            config,
            format,
        })
    }

    /// Open the queue store; falls back to memory if the database is unusable.
    #[must_use]
    pub fn open_store(&self) -> Arc<SyncStore> {
        Arc::new(SyncStore::open_at(&self.paths.database))
    }

    /// Build an executor talking to the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL is invalid.
    pub fn executor(
        &self,
        store: Arc<SyncStore>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Result<SyncExecutor, SyncError> {
        let transport = HttpTransport::new(
            &self.config.sync.api_base_url,
            self.config.sync.request_timeout(),
        )?;

        Ok(
            SyncExecutor::new(store, Arc::new(transport), connectivity)
                .with_backoff(Backoff::from(&self.config.backoff)),
        )
    }
}

/// Generate a completion script for `shell`.
#[must_use]
pub fn completions(shell: Shell) -> String {
    let mut buffer = Vec::new();
    clap_complete::generate(shell, &mut Cli::command(), "planner-sync", &mut buffer);
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_context_applies_overrides() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let home = temp_dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from([
            "planner-sync",
            "--home",
            home,
            "--api-url",
            "https://api.example.com",
            "status",
        ])
        .unwrap();

        let ctx = AppContext::from_cli(&cli).unwrap();

        assert_eq!(ctx.paths.root, temp_dir.path());
        assert_eq!(ctx.config.sync.api_base_url, "https://api.example.com");
        assert_eq!(ctx.format, OutputFormat::Pretty);
    }

    #[test]
    fn test_context_uses_configured_output() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.yaml"),
            "general:\n  default_output: json\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "planner-sync",
            "--home",
            temp_dir.path().to_str().unwrap(),
            "status",
        ])
        .unwrap();

        assert_eq!(AppContext::from_cli(&cli).unwrap().format, OutputFormat::Json);
    }

    #[test]
    fn test_completions_mention_binary() {
        assert!(completions(Shell::Bash).contains("planner-sync"));
    }
}
