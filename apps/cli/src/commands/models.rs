//! `vigil models`

use anyhow::Context;
use colored::Colorize;
use vigil_orchestrator::Settings;
use vigil_store::{ModelRecord, TrainStatus};

use super::{model_store, open_database};

/// Lists the model records of a user.
pub async fn execute(settings: &Settings, user_id: &str, json_output: bool) -> anyhow::Result<()> {
    let db = open_database(settings)?;
    let store = model_store();
    let models = db
        .with_connection(|conn| store.list_models_for_user(conn, user_id))
        .await
        .with_context(|| format!("Failed to list models of {user_id}"))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        print_human(user_id, &models);
    }
    Ok(())
}

fn print_human(user_id: &str, models: &[ModelRecord]) {
    if models.is_empty() {
        println!("{}", format!("No models for {user_id}").yellow());
        return;
    }

    println!("{}", format!("Models of {user_id}").bold());
    for model in models {
        let status = match model.train_status {
            TrainStatus::NotTrain => model.train_status.to_string().dimmed(),
            TrainStatus::InTrainProcess | TrainStatus::InTuneProcess => model.train_status.to_string().yellow(),
            TrainStatus::Train => model.train_status.to_string().green(),
        };
        println!(
            "  {:<16} {:<18} features {:>8}  used {:>8}  artifact {}",
            model.model_type.cyan(),
            status,
            model.features_count,
            model.features_count_used,
            model.artifact_key.as_deref().unwrap_or("-")
        );
    }
}
