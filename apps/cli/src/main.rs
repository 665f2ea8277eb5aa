//! Vigil CLI - model lifecycle orchestrator
//!
//! The `vigil` binary runs the training scheduler and the result consumer,
//! and offers maintenance commands for queues and model records.

mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use vigil_orchestrator::Settings;

/// Vigil - decides when user models need (re)training and tracks the results
#[derive(Parser, Debug)]
#[command(name = "vigil", author, version, about = "Vigil - model lifecycle orchestrator")]
struct Args {
    /// Configuration file (./vigil.toml is read when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides logging.level and RUST_LOG (e.g. "debug", "vigil_orchestrator=trace")
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training scheduler
    ///
    /// Declares one queue per configured model type, then dispatches train
    /// and tune jobs on the configured cron schedule until interrupted.
    Trainer,

    /// Run the result consumer
    ///
    /// Applies completion results from the result queue until interrupted
    /// or the broker closes the subscription.
    Updater,

    /// Run the training scheduler and the result consumer together
    Run,

    /// Declare the dispatch queues and the result queue, then exit
    InitQueues,

    /// Run a single scheduler pass, then exit
    Tick,

    /// Show the model records of a user
    Models {
        /// User identifier
        user_id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record newly ingested features for a model
    ///
    /// Creates the model record on first use.
    Ingest {
        /// User identifier
        user_id: String,

        /// Model type (must match a configured threshold entry to be scheduled)
        model_type: String,

        /// Number of feature rows ingested
        count: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    logging::init(&settings.logging, args.log_level.as_deref())?;

    match args.command {
        Command::Trainer => commands::trainer::execute(&settings).await,
        Command::Updater => commands::updater::execute(&settings).await,
        Command::Run => commands::run::execute(&settings).await,
        Command::InitQueues => commands::init_queues::execute(&settings).await,
        Command::Tick => commands::tick::execute(&settings).await,
        Command::Models { user_id, json } => commands::models::execute(&settings, &user_id, json).await,
        Command::Ingest { user_id, model_type, count } => {
            commands::ingest::execute(&settings, &user_id, &model_type, count).await
        }
    }
}
