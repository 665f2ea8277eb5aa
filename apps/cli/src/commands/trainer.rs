//! `vigil trainer`

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_orchestrator::Settings;

use super::{build_scheduler, cancel_on_ctrl_c, close_broker, connect_broker, model_store, open_database};

/// Runs the training scheduler until ctrl-c.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let broker = connect_broker(settings).await?;
    let shutdown = CancellationToken::new();
    let scheduler =
        build_scheduler(settings, db, model_store(), broker.clone())?.with_shutdown(shutdown.clone());

    scheduler.init_queues().await.context("Failed to declare dispatch queues")?;
    cancel_on_ctrl_c(shutdown);

    let outcome = scheduler.run(&settings.trainer.cron).await;
    close_broker(&broker).await;
    let ticks = outcome.context("Training scheduler failed")?;
    info!(ticks, "Trainer exited");
    Ok(())
}
