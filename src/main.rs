use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use planner_sync::cli::args::{Cli, Commands};
use planner_sync::cli::commands::{self, AppContext};
use planner_sync::logging;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Completions must work even with a broken config file.
    if let Commands::Completions { shell } = cli.command {
        print!("{}", commands::completions(shell));
        return Ok(());
    }

    let ctx = AppContext::from_cli(&cli).context("failed to load configuration")?;
    logging::init(&ctx.config.logging);
    let format = ctx.format;

    let output = match cli.command {
        Commands::Enqueue(args) => commands::enqueue(&ctx.open_store(), args, format)?,
        Commands::Status => commands::status(&ctx.open_store(), format)?,
        Commands::List { eligible, limit } => {
            commands::list(&ctx.open_store(), eligible, limit, format)?
        }
        Commands::Run { offline } => commands::run(&ctx, offline).await?,
        Commands::Watch => commands::watch(&ctx).await?,
        Commands::Retry { all, id } => commands::retry(&ctx.open_store(), all, id, format)?,
        Commands::Conflicts(args) => commands::conflicts(&ctx.open_store(), args.command, format)?,
        Commands::Config(args) => commands::config(&ctx, args.command)?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
