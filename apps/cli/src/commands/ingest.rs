//! `vigil ingest`

use anyhow::Context;
use vigil_orchestrator::Settings;

use super::{model_store, open_database};

/// Adds `count` features to a model record and prints its new state.
pub async fn execute(settings: &Settings, user_id: &str, model_type: &str, count: u64) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let store = model_store();

    let model = db
        .with_connection(|conn| {
            store.record_features(conn, user_id, model_type, count)?;
            store.get_model(conn, user_id, model_type)
        })
        .await
        .with_context(|| format!("Failed to record features for {user_id}/{model_type}"))?;

    println!(
        "{}/{}: {} features ({} unused), {}",
        model.user_id,
        model.model_type,
        model.features_count,
        model.unused_features(),
        model.train_status
    );
    Ok(())
}
