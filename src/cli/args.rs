use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::config::HOME_ENV;

/// Environment variable overriding `sync.api_base_url`.
pub const API_URL_ENV: &str = "PLANNER_SYNC_API_URL";

#[derive(Parser)]
#[command(name = "planner-sync")]
#[command(about = "Offline sync queue for the planner: tasks, events and transactions")]
#[command(long_about = "planner-sync - Offline sync queue for the planner

Local mutations (create, update, delete) are queued durably and pushed to the
remote API when connectivity allows. Transient failures are retried with
exponential backoff; mutations the server rejects as conflicting are frozen
and listed for manual resolution.

QUICK START:
  planner-sync enqueue task create --payload '{\"title\":\"Buy milk\"}'
  planner-sync status                 Show queue statistics
  planner-sync run                    Push eligible actions now
  planner-sync watch                  Keep syncing until Ctrl-C
  planner-sync conflicts list         Show rejected mutations

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  planner-sync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory holding config.yaml and the queue database
    #[arg(long, global = true, env = HOME_ENV, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Base URL of the remote API (overrides the config file)
    #[arg(long, global = true, env = API_URL_ENV, value_name = "URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a local mutation
    ///
    /// The payload carries the entity's fields. Updates and deletes must
    /// identify the entity, either through an `id` field in the payload or
    /// with --id.
    ///
    /// # Examples
    ///
    ///   planner-sync enqueue task create --payload '{"title":"Buy milk"}'
    ///   planner-sync enqueue event update --id 5 --payload '{"name":"Standup"}'
    ///   planner-sync enqueue transaction delete --id tx-9
    #[command(alias = "q")]
    Enqueue(EnqueueArgs),

    /// Show queue statistics
    ///
    /// Counts actions by status, recorded conflicts, the oldest unsynced
    /// mutation and when the next retry is due.
    Status,

    /// List queued actions
    ///
    /// # Examples
    ///
    ///   planner-sync list                 All actions, oldest first
    ///   planner-sync list --eligible      Only actions a drain would send now
    ///   planner-sync list -n 5 -o json    First five as JSON
    #[command(alias = "ls")]
    List {
        /// Only actions eligible to be sent right now
        #[arg(long)]
        eligible: bool,

        /// Maximum actions to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: usize,
    },

    /// Run one drain pass against the remote API
    Run {
        /// Treat the network as unavailable (nothing is sent)
        #[arg(long)]
        offline: bool,
    },

    /// Keep syncing in the foreground until Ctrl-C
    ///
    /// Drains once at start, then on the periodic timer and whenever a
    /// trigger arrives on stdin, one per line:
    ///
    ///   online | offline      Connectivity changed
    ///   visible | hidden      Application visibility changed
    ///   message <tag>         Background-sync wake message
    Watch,

    /// Make retrying actions eligible immediately
    ///
    /// Clears the backoff delay; the attempt count is kept.
    Retry {
        /// Every action waiting out a backoff
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// A single action
        id: Option<String>,
    },

    /// Inspect and resolve recorded conflicts
    Conflicts(ConflictsArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   planner-sync completions zsh > ~/.zfunc/_planner-sync
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for queueing a mutation.
#[derive(Args)]
pub struct EnqueueArgs {
    /// Entity type (task, event, transaction)
    pub entity: String,

    /// Mutation (create, update, delete)
    pub action: String,

    /// Entity fields as a JSON object
    #[arg(long, short = 'p')]
    pub payload: Option<String>,

    /// Entity id, merged into the payload
    #[arg(long, short = 'i')]
    pub id: Option<String>,

    /// Authoring time (RFC 3339); defaults to now
    #[arg(long, value_name = "TIMESTAMP")]
    pub at: Option<String>,
}

#[derive(Args)]
pub struct ConflictsArgs {
    #[command(subcommand)]
    pub command: ConflictsCommands,
}

/// Conflict subcommands.
#[derive(Subcommand)]
pub enum ConflictsCommands {
    /// List recorded conflicts, newest first
    List,

    /// Show local and remote state for a conflict
    Show {
        /// Conflict id
        id: String,
    },

    /// Mark a conflict resolved by removing it
    #[command(alias = "rm")]
    Remove {
        /// Conflict id
        id: String,

        /// Also drop the frozen queue action
        #[arg(long)]
        drop_action: bool,
    },
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
