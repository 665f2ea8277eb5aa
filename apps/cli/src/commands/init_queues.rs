//! `vigil init-queues`

use anyhow::Context;
use vigil_broker::Publisher;
use vigil_orchestrator::Settings;

use super::{close_broker, connect_broker, load_thresholds};

/// Declares one dispatch queue per model type plus the result queue.
pub async fn execute(settings: &Settings) -> anyhow::Result<()> {
    let thresholds = load_thresholds(settings)?;
    let mut queues = thresholds.model_types();
    queues.push(settings.updater.result_queue.clone());

    let broker = connect_broker(settings).await?;
    let outcome = broker.declare_queues(&queues).await;
    close_broker(&broker).await;
    outcome.context("Failed to declare queues")?;

    for queue in &queues {
        println!("{queue}");
    }
    Ok(())
}
