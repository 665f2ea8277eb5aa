//! End-to-end model lifecycle: dispatch, completion, fine-tune dispatch.

mod common;

use std::sync::Arc;

use common::{FACE, RecordingPresigner, harness, harness_with, thresholds};
use vigil_orchestrator::{JobMessage, PassSummary};
use vigil_store::TrainStatus;

#[tokio::test]
async fn test_full_train_then_tune_cycle() {
    let h = harness();
    h.seed("a", 120, 0, TrainStatus::NotTrain, None).await;

    // First tick dispatches a train job.
    let report = h.scheduler.tick().await;
    assert_eq!(report.pass(FACE).unwrap().as_ref().unwrap().trained, 1);
    assert_eq!(h.model("a").await.train_status, TrainStatus::InTrainProcess);
    assert_eq!(
        h.jobs(FACE),
        vec![JobMessage::Train { user_id: "a".to_string(), model_type: FACE.to_string() }]
    );

    // The trainer reports completion.
    let consumer = Arc::new(h.consumer());
    let running = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move { consumer.run().await })
    };
    h.push_result("a", "m1", 120);
    h.wait_for_status("a", TrainStatus::Train).await;
    consumer.stop();
    let stats = running.await.unwrap().unwrap();
    assert_eq!(stats.applied, 1);

    let model = h.model("a").await;
    assert_eq!(model.artifact_key.as_deref(), Some("m1"));
    assert_eq!(model.features_count_used, 120);
    assert!(model.features_count >= model.features_count_used);

    // 25 more features arrive, enough for a fine-tune.
    h.ingest("a", 25).await;
    assert_eq!(h.model("a").await.features_count, 145);

    let report = h.scheduler.tick().await;
    assert_eq!(report.pass(FACE).unwrap().as_ref().unwrap().tuned, 1);
    assert_eq!(h.model("a").await.train_status, TrainStatus::InTuneProcess);

    let jobs = h.jobs(FACE);
    assert_eq!(jobs.len(), 2);
    assert_eq!(
        jobs[1],
        JobMessage::Tune {
            user_id: "a".to_string(),
            model_type: FACE.to_string(),
            model_features: 145,
            model_url: "https://storage.test/m1?signed".to_string(),
        }
    );
    assert_eq!(*h.presigner.keys.lock().unwrap(), vec!["m1".to_string()]);
}

#[tokio::test]
async fn test_each_eligible_model_gets_exactly_one_job() {
    let h = harness();
    h.seed("a", 100, 0, TrainStatus::NotTrain, None).await;
    h.seed("b", 250, 0, TrainStatus::NotTrain, None).await;
    h.seed("c", 140, 120, TrainStatus::Train, Some("models/c")).await;

    let report = h.scheduler.tick().await;
    assert_eq!(
        report.pass(FACE).unwrap().as_ref().unwrap(),
        &PassSummary { trained: 2, tuned: 1, skipped: 0 }
    );

    let jobs = h.jobs(FACE);
    let users: Vec<(&str, &str)> = jobs.iter().map(|job| (job.kind(), job.user_id())).collect();
    assert_eq!(users, vec![("train", "a"), ("train", "b"), ("tune", "c")]);

    assert_eq!(h.model("a").await.train_status, TrainStatus::InTrainProcess);
    assert_eq!(h.model("b").await.train_status, TrainStatus::InTrainProcess);
    assert_eq!(h.model("c").await.train_status, TrainStatus::InTuneProcess);

    // In-progress models are not dispatched again.
    let report = h.scheduler.tick().await;
    assert_eq!(report.dispatched(), 0);
    assert_eq!(h.jobs(FACE).len(), 3);
}

#[tokio::test]
async fn test_non_eligible_models_are_untouched() {
    let h = harness();
    h.seed("below-train", 99, 0, TrainStatus::NotTrain, None).await;
    h.seed("below-tune", 140, 121, TrainStatus::Train, Some("models/x")).await;
    h.seed("training", 500, 0, TrainStatus::InTrainProcess, None).await;
    h.seed("tuning", 500, 100, TrainStatus::InTuneProcess, Some("models/y")).await;

    let report = h.scheduler.tick().await;

    assert_eq!(report.dispatched(), 0);
    assert_eq!(report.failed(), 0);
    assert!(h.jobs(FACE).is_empty());
    assert_eq!(h.model("below-train").await.train_status, TrainStatus::NotTrain);
    assert_eq!(h.model("below-tune").await.train_status, TrainStatus::Train);
    assert_eq!(h.model("training").await.train_status, TrainStatus::InTrainProcess);
    assert_eq!(h.model("tuning").await.train_status, TrainStatus::InTuneProcess);
}

#[tokio::test]
async fn test_tick_with_empty_store_is_noop() {
    let h = harness();
    let report = h.scheduler.tick().await;

    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.pass(FACE).unwrap().as_ref().unwrap(), &PassSummary::default());
    assert!(h.broker.published().is_empty());
}

#[tokio::test]
async fn test_tune_candidate_without_artifact_is_skipped() {
    let h = harness();
    h.seed("orphan", 200, 100, TrainStatus::Train, None).await;

    let report = h.scheduler.tick().await;

    assert_eq!(report.pass(FACE).unwrap().as_ref().unwrap().skipped, 1);
    assert_eq!(h.model("orphan").await.train_status, TrainStatus::Train);
    assert!(h.jobs(FACE).is_empty());
}

#[tokio::test]
async fn test_model_types_dispatch_to_their_own_queues() {
    let h = harness_with(
        thresholds(&[("face_model", 100, 20), ("voice_model", 10, 5)]),
        RecordingPresigner::default(),
    );
    h.seed("a", 100, 0, TrainStatus::NotTrain, None).await;
    h.seed_type("a", "voice_model", 10, 0, TrainStatus::NotTrain, None).await;

    h.scheduler.init_queues().await.unwrap();
    assert_eq!(h.broker.queue_names(), vec!["face_model".to_string(), "voice_model".to_string()]);

    let report = h.scheduler.tick().await;
    assert_eq!(report.dispatched(), 2);
    assert_eq!(h.jobs("face_model").len(), 1);
    assert_eq!(h.jobs("voice_model")[0].model_type(), "voice_model");
    assert_eq!(h.model_of("a", "voice_model").await.train_status, TrainStatus::InTrainProcess);
}
