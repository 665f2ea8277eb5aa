//! Shared test utilities for the orchestrator integration tests.
//!
//! Every harness runs against an in-memory SQLite database, the in-memory
//! broker and a presigner that records the keys it was asked for.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vigil_broker::{AckMode, InMemoryBroker};
use vigil_orchestrator::{
    JobMessage, ModelTrainThreshold, OrchestratorError, Presigner, ResultConsumer, Thresholds,
    TrainingScheduler,
};
use vigil_store::{Database, ModelRecord, ModelStore, SqliteModelStore, TrainStatus};

pub const FACE: &str = "face_model";
pub const RESULT_QUEUE: &str = "result";

/// Returns `https://storage.test/<key>?signed` and remembers each key.
#[derive(Default)]
pub struct RecordingPresigner {
    pub keys: Mutex<Vec<String>>,
    pub fail: bool,
    /// Time each call takes before answering.
    pub delay: Option<Duration>,
}

#[async_trait]
impl Presigner for RecordingPresigner {
    async fn presign(&self, key: &str) -> vigil_orchestrator::Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(OrchestratorError::Presign {
                key: key.to_string(),
                message: "signing credentials expired".to_string(),
            });
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("https://storage.test/{key}?signed"))
    }
}

pub struct Harness {
    pub db: Database,
    pub store: Arc<SqliteModelStore>,
    pub broker: InMemoryBroker,
    pub presigner: Arc<RecordingPresigner>,
    pub scheduler: TrainingScheduler,
}

pub fn thresholds(entries: &[(&str, u64, u64)]) -> Thresholds {
    entries
        .iter()
        .map(|(name, train_threshold, tune_threshold)| {
            (
                (*name).to_string(),
                ModelTrainThreshold { train_threshold: *train_threshold, tune_threshold: *tune_threshold },
            )
        })
        .collect()
}

/// Harness with `face_model` thresholds `{train: 100, tune: 20}`.
pub fn harness() -> Harness {
    harness_with(thresholds(&[(FACE, 100, 20)]), RecordingPresigner::default())
}

pub fn harness_with(thresholds: Thresholds, presigner: RecordingPresigner) -> Harness {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(SqliteModelStore::new());
    let broker = InMemoryBroker::new(AckMode::Manual);
    let presigner = Arc::new(presigner);
    let scheduler = TrainingScheduler::new(
        db.clone(),
        store.clone(),
        Arc::new(broker.clone()),
        presigner.clone(),
        thresholds,
    );
    Harness { db, store, broker, presigner, scheduler }
}

impl Harness {
    pub fn consumer(&self) -> ResultConsumer {
        ResultConsumer::new(self.db.clone(), self.store.clone(), Arc::new(self.broker.clone()), RESULT_QUEUE)
            .with_requeue_delay(Duration::from_millis(10))
    }

    /// Creates or overwrites a record of `model_type`.
    pub async fn seed_type(
        &self,
        user_id: &str,
        model_type: &str,
        features_count: u64,
        used: u64,
        status: TrainStatus,
        artifact_key: Option<&str>,
    ) {
        let store = self.store.clone();
        self.db
            .with_connection(|conn| {
                store.record_features(conn, user_id, model_type, features_count)?;
                store.set_features_count_used(conn, user_id, model_type, used)?;
                store.set_status(conn, user_id, model_type, status)?;
                if let Some(key) = artifact_key {
                    store.set_artifact_key(conn, user_id, model_type, key)?;
                }
                Ok(())
            })
            .await
            .unwrap();
    }

    pub async fn seed(
        &self,
        user_id: &str,
        features_count: u64,
        used: u64,
        status: TrainStatus,
        artifact_key: Option<&str>,
    ) {
        self.seed_type(user_id, FACE, features_count, used, status, artifact_key).await;
    }

    pub async fn ingest(&self, user_id: &str, count: u64) {
        let store = self.store.clone();
        self.db.with_connection(|conn| store.record_features(conn, user_id, FACE, count)).await.unwrap();
    }

    pub async fn model(&self, user_id: &str) -> ModelRecord {
        self.model_of(user_id, FACE).await
    }

    pub async fn model_of(&self, user_id: &str, model_type: &str) -> ModelRecord {
        let store = self.store.clone();
        self.db.with_connection(|conn| store.get_model(conn, user_id, model_type)).await.unwrap()
    }

    /// Makes every status update of `user_id` fail inside SQLite.
    pub async fn fail_status_updates_for(&self, user_id: &str) {
        let sql = format!(
            "CREATE TRIGGER fail_status_{user_id} BEFORE UPDATE OF train_status ON models \
             WHEN NEW.user_id = '{user_id}' \
             BEGIN SELECT RAISE(ABORT, 'forced failure'); END;"
        );
        self.db.with_connection(|conn| Ok(conn.execute_batch(&sql)?)).await.unwrap();
    }

    pub async fn restore_status_updates_for(&self, user_id: &str) {
        let sql = format!("DROP TRIGGER fail_status_{user_id};");
        self.db.with_connection(|conn| Ok(conn.execute_batch(&sql)?)).await.unwrap();
    }

    /// Decoded jobs waiting on `queue`, oldest first.
    pub fn jobs(&self, queue: &str) -> Vec<JobMessage> {
        self.broker.pending(queue).iter().map(|body| serde_json::from_slice(body).unwrap()).collect()
    }

    /// Polls until `user_id` reaches `status`, for up to two seconds.
    pub async fn wait_for_status(&self, user_id: &str, status: TrainStatus) {
        for _ in 0..200 {
            if self.model(user_id).await.train_status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{user_id} did not reach {status} within two seconds");
    }

    /// Polls until nothing is pending on `queue`, for up to two seconds.
    pub async fn wait_until_drained(&self, queue: &str) {
        for _ in 0..200 {
            if self.broker.pending(queue).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{queue} still has pending messages after two seconds");
    }

    pub fn push_result(&self, user_id: &str, model_url: &str, features_count: u64) {
        let body = serde_json::json!({
            "model_type": FACE,
            "user_id": user_id,
            "model_url": model_url,
            "features_count": features_count,
        });
        self.broker.push(RESULT_QUEUE, serde_json::to_vec(&body).unwrap());
    }
}
