//! `vigil run`

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use vigil_orchestrator::Settings;

use super::{
    build_consumer, build_scheduler, cancel_on_ctrl_c, close_broker, connect_broker, model_store,
    open_database,
};

/// Runs the scheduler and the result consumer on one store and one broker
/// connection. Either one stopping stops the other.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let store = model_store();
    let broker = connect_broker(settings).await?;
    let shutdown = CancellationToken::new();

    let scheduler = build_scheduler(settings, db.clone(), store.clone(), broker.clone())?
        .with_shutdown(shutdown.clone());
    let consumer = build_consumer(settings, db, store, broker.clone()).with_shutdown(shutdown.clone());

    scheduler.init_queues().await.context("Failed to declare dispatch queues")?;
    cancel_on_ctrl_c(shutdown.clone());

    let (scheduled, consumed) = tokio::join!(
        async {
            let outcome = scheduler.run(&settings.trainer.cron).await;
            shutdown.cancel();
            outcome
        },
        async {
            let outcome = consumer.run().await;
            shutdown.cancel();
            outcome
        },
    );

    close_broker(&broker).await;
    scheduled.context("Training scheduler failed")?;
    consumed.context("Result consumer failed")?;
    Ok(())
}
