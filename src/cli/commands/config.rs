//! Configuration commands.

use serde_json::json;

use super::AppContext;
use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::Config;
use crate::error::SyncError;
use crate::output::to_json;

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the file cannot be written, already exists without
/// `--force`, or output formatting fails.
pub fn config(ctx: &AppContext, cmd: ConfigCommands) -> Result<String, SyncError> {
    match cmd {
        ConfigCommands::Show => match ctx.format {
            OutputFormat::Json => to_json(&ctx.config),
            OutputFormat::Pretty => Ok(serde_yaml::to_string(&ctx.config)?.trim_end().to_string()),
        },
        ConfigCommands::Path => {
            let path = ctx.paths.config_file.display().to_string();
            match ctx.format {
                OutputFormat::Json => to_json(&json!({
                    "config_file": path,
                    "database": ctx.paths.database.display().to_string(),
                })),
                OutputFormat::Pretty => Ok(path),
            }
        }
        ConfigCommands::Init { force } => {
            if ctx.paths.config_file.exists() && !force {
                return Err(SyncError::Config(format!(
                    "{} already exists; use --force to overwrite",
                    ctx.paths.config_file.display()
                )));
            }

            Config::default().save(&ctx.paths)?;

            match ctx.format {
                OutputFormat::Json => to_json(&json!({ "written": ctx.paths.config_file.display().to_string() })),
                OutputFormat::Pretty => Ok(format!(
                    "Wrote default configuration to {}",
                    ctx.paths.config_file.display()
                )),
            }
        }
    }
}
