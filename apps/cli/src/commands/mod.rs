//! Command implementations for the Vigil CLI.

pub mod ingest;
pub mod init_queues;
pub mod models;
pub mod run;
pub mod tick;
pub mod trainer;
pub mod updater;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vigil_broker::AmqpBroker;
use vigil_orchestrator::{ResultConsumer, S3Presigner, Settings, Thresholds, TrainingScheduler};
use vigil_store::{Database, ModelStore, SqliteModelStore};

pub fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    let path = &settings.database.path;
    Database::open(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

pub fn model_store() -> Arc<dyn ModelStore> {
    Arc::new(SqliteModelStore::new())
}

pub async fn connect_broker(settings: &Settings) -> anyhow::Result<Arc<AmqpBroker>> {
    let broker = AmqpBroker::connect(&settings.broker.amqp_config())
        .await
        .context("Failed to connect to message broker")?;
    Ok(Arc::new(broker))
}

pub fn load_thresholds(settings: &Settings) -> anyhow::Result<Thresholds> {
    let path = &settings.trainer.thresholds_path;
    Thresholds::load(path).with_context(|| format!("Failed to load thresholds from {}", path.display()))
}

pub fn build_scheduler(
    settings: &Settings,
    db: Database,
    store: Arc<dyn ModelStore>,
    broker: Arc<AmqpBroker>,
) -> anyhow::Result<TrainingScheduler> {
    let thresholds = load_thresholds(settings)?;
    let presigner =
        S3Presigner::from_settings(&settings.storage).context("Failed to configure object storage")?;
    Ok(TrainingScheduler::new(db, store, broker, Arc::new(presigner), thresholds))
}

pub fn build_consumer(
    settings: &Settings,
    db: Database,
    store: Arc<dyn ModelStore>,
    broker: Arc<AmqpBroker>,
) -> ResultConsumer {
    ResultConsumer::new(db, store, broker, settings.updater.result_queue.clone())
        .with_requeue_delay(settings.updater.requeue_delay())
}

/// Cancels `token` on the first ctrl-c.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        }
        token.cancel();
    });
}

/// Closes the broker connection, logging instead of failing.
pub async fn close_broker(broker: &AmqpBroker) {
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker connection cleanly");
    }
}
