//! `vigil updater`

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vigil_orchestrator::Settings;

use super::{build_consumer, cancel_on_ctrl_c, close_broker, connect_broker, model_store, open_database};

/// Consumes training results until ctrl-c or the broker ends the subscription.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let broker = connect_broker(settings).await?;
    let shutdown = CancellationToken::new();
    let consumer = build_consumer(settings, db, model_store(), broker.clone()).with_shutdown(shutdown.clone());

    cancel_on_ctrl_c(shutdown);

    let outcome = consumer.run().await;
    close_broker(&broker).await;
    let stats = outcome.context("Result consumer failed")?;
    info!(applied = stats.applied, discarded = stats.discarded, requeued = stats.requeued, "Updater finished");
    Ok(())
}
