mod cli;
mod commands;
mod terminal;

use anyhow::Result;
use clap::Parser;
use rad_core::config::{load_dotenv, Config};
use tracing::error;

use crate::cli::{CliArgs, Command};
use crate::commands::RunContext;
use crate::terminal::Terminal;

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let terminal = Terminal::new();
    if let Err(e) = run(&terminal) {
        error!(error = %e, "Command failed");
        terminal.print_error(&format!("{:#}", e)).ok();
        std::process::exit(1);
    }
}

fn run(terminal: &Terminal) -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();

    let config = match args.profile.as_deref() {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let ctx = RunContext {
        config: &config,
        terminal,
        json: args.json,
    };

    match &args.command {
        Command::Plan { original, desired } => commands::plan(&ctx, original.as_deref(), desired),
        Command::Apply {
            store,
            desired,
            original_name,
            training,
            dry_run,
        } => commands::apply(
            &ctx,
            store,
            desired,
            original_name.as_deref(),
            training.as_deref(),
            *dry_run,
        ),
        Command::Add { store, groups } => commands::add(&ctx, store, groups),
        Command::Remove {
            store,
            data_miner_id,
            names,
        } => commands::remove(&ctx, store, *data_miner_id, names),
        Command::Retrain {
            store,
            group,
            data_miner_id,
            ranges,
        } => commands::retrain(&ctx, store, group, *data_miner_id, ranges),
        Command::Groups {
            store,
            listing,
            only_unmonitored,
        } => commands::list_groups(&ctx, store, listing, *only_unmonitored),
        Command::Subgroups {
            store,
            group,
            data_miner_id,
            listing,
            only_errors,
        } => {
            commands::list_subgroups(&ctx, store, group, *data_miner_id, listing, *only_errors)
        }
    }
}
