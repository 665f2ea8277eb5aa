//! Applies training results published by the trainer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_broker::{Delivery, Subscriber};
use vigil_store::{Database, ModelStore, StorageError, TrainStatus, Tx};

use crate::error::{OrchestratorError, Result};
use crate::messages::ResultMessage;

/// Counters for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Results committed and acknowledged.
    pub applied: usize,
    /// Undecodable results, or results for unknown models, dropped.
    pub discarded: usize,
    /// Results whose transaction failed, handed back to the queue.
    pub requeued: usize,
}

const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Long-running subscriber on the result queue.
///
/// A result whose transaction fails is held for the requeue delay before it
/// is handed back, so a store that keeps failing is retried at that pace.
pub struct ResultConsumer {
    db: Database,
    store: Arc<dyn ModelStore>,
    subscriber: Arc<dyn Subscriber>,
    queue: String,
    requeue_delay: Duration,
    shutdown: CancellationToken,
}

impl fmt::Debug for ResultConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultConsumer")
            .field("queue", &self.queue)
            .field("requeue_delay", &self.requeue_delay)
            .finish_non_exhaustive()
    }
}

impl ResultConsumer {
    pub fn new(
        db: Database,
        store: Arc<dyn ModelStore>,
        subscriber: Arc<dyn Subscriber>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            db,
            store,
            subscriber,
            queue: queue.into(),
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Stops [`run`](Self::run) once the current delivery is settled.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Consumes the result queue until the broker ends the subscription or
    /// [`stop`](Self::stop) is called.
    ///
    /// # Errors
    /// Returns an error if the subscription cannot be opened or the broker
    /// reports a delivery failure.
    pub async fn run(&self) -> Result<ConsumerStats> {
        let mut subscription = self.subscriber.consume(&self.queue).await?;
        info!(queue = %self.queue, "Result consumer started");

        let mut stats = ConsumerStats::default();
        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break Ok(()),
                next = subscription.next() => next,
            };
            match next {
                Some(Ok(delivery)) => self.handle(&delivery, &mut stats).await,
                Some(Err(e)) => {
                    error!(queue = %self.queue, error = %e, "Result subscription failed");
                    break Err(OrchestratorError::from(e));
                }
                None => {
                    info!(queue = %self.queue, "Result queue closed");
                    break Ok(());
                }
            }
        };

        subscription.release().await;
        info!(
            applied = stats.applied,
            discarded = stats.discarded,
            requeued = stats.requeued,
            "Result consumer stopped"
        );
        outcome.map(|()| stats)
    }

    async fn handle(&self, delivery: &Delivery, stats: &mut ConsumerStats) {
        let result = match ResultMessage::from_slice(delivery.body()) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, bytes = delivery.body().len(), "Failed to decode result message, discarding");
                settle(delivery, Some(false)).await;
                stats.discarded += 1;
                return;
            }
        };
        let user_id = result.user_id.clone();
        let model_type = result.model_type.clone();

        match self.apply_result(None, result).await {
            Ok(()) => {
                settle(delivery, None).await;
                stats.applied += 1;
            }
            Err(OrchestratorError::Storage(StorageError::NotFound(what))) => {
                warn!(user_id = %user_id, model_type = %model_type, model = %what, "Result for unknown model, discarding");
                settle(delivery, Some(false)).await;
                stats.discarded += 1;
            }
            Err(e) => {
                error!(
                    user_id = %user_id,
                    model_type = %model_type,
                    redelivered = delivery.is_redelivered(),
                    retry_in = ?self.requeue_delay,
                    error = %e,
                    "Failed to apply result, requeueing"
                );
                // Cut short on shutdown; the message goes back either way.
                tokio::select! {
                    () = self.shutdown.cancelled() => {}
                    () = tokio::time::sleep(self.requeue_delay) => {}
                }
                settle(delivery, Some(true)).await;
                stats.requeued += 1;
            }
        }
    }

    /// Records a training result in one transaction: stores the new artifact
    /// key, marks the model `train`, and sets `features_count_used`.
    ///
    /// Joins `scope` when it carries an open transaction.
    ///
    /// # Errors
    /// * `StorageError::NotFound` - If no record matches the result
    /// * `StorageError::Database` - If any update fails; nothing is applied
    pub async fn apply_result(&self, scope: Option<&mut Tx>, result: ResultMessage) -> Result<()> {
        let store = Arc::clone(&self.store);

        self.db
            .within_transaction(scope, move |tx| {
                Box::pin(async move {
                    let conn = tx.conn();
                    let ResultMessage { model_type, user_id, model_url, features_count } = result;

                    let model = store.get_model(conn, &user_id, &model_type)?;
                    if !model.train_status.is_in_progress() {
                        warn!(
                            user_id = %user_id,
                            model_type = %model_type,
                            status = %model.train_status,
                            "Result for a model that was not being trained"
                        );
                    }

                    let used = if features_count > model.features_count {
                        warn!(
                            user_id = %user_id,
                            model_type = %model_type,
                            reported = features_count,
                            features_count = model.features_count,
                            "Result reports more features than recorded, clamping"
                        );
                        model.features_count
                    } else {
                        features_count
                    };

                    store.set_artifact_key(conn, &user_id, &model_type, &model_url)?;
                    store.set_status(conn, &user_id, &model_type, TrainStatus::Train)?;
                    store.set_features_count_used(conn, &user_id, &model_type, used)?;

                    info!(
                        user_id = %user_id,
                        model_type = %model_type,
                        features_count_used = used,
                        "Applied training result"
                    );
                    Ok(())
                })
            })
            .await
    }
}

/// Acks when `reject` is `None`, otherwise rejects with the given requeue flag.
async fn settle(delivery: &Delivery, reject: Option<bool>) {
    let outcome = match reject {
        None => delivery.ack().await,
        Some(requeue) => delivery.reject(requeue).await,
    };
    match outcome {
        Ok(()) => debug!(requeue = ?reject, "Settled delivery"),
        Err(e) => error!(error = %e, "Failed to settle delivery"),
    }
}
