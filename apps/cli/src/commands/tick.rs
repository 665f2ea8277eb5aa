//! `vigil tick`

use anyhow::{Context, bail};
use colored::Colorize;
use vigil_orchestrator::Settings;

use super::{build_scheduler, close_broker, connect_broker, model_store, open_database};

/// Runs one scheduler pass and prints what was dispatched.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let broker = connect_broker(settings).await?;
    let scheduler = build_scheduler(settings, db, model_store(), broker.clone())?;

    scheduler.init_queues().await.context("Failed to declare dispatch queues")?;
    let report = scheduler.tick().await;
    close_broker(&broker).await;

    for (model_type, outcome) in &report.passes {
        match outcome {
            Ok(summary) => println!(
                "  {} {} trained, {} tuned, {} skipped",
                model_type.cyan(),
                summary.trained.to_string().green(),
                summary.tuned.to_string().green(),
                summary.skipped.to_string().dimmed()
            ),
            Err(e) => println!("  {} {}", model_type.cyan(), format!("failed: {e}").red()),
        }
    }

    if report.failed() > 0 {
        bail!("{} of {} model type passes failed", report.failed(), report.passes.len());
    }
    Ok(())
}
