//! Recurring training dispatch.
//!
//! Every tick walks the configured model types. For each type one
//! transaction covers the whole pass: train candidates are moved to
//! `in_train_process` and get a `train` job, tune candidates are moved to
//! `in_tune_process` and get a `tune` job pointing at a presigned copy of
//! their current artifact. A failure anywhere in the pass rolls back every
//! status change of that type; jobs already published stay published.
//!
//! Publishing and presigning happen inside the pass transaction, so the
//! store connection is held for the broker and object store round trips.
//! Result consumption and ingestion wait until the pass commits.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use cron::Schedule;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_broker::Publisher;
use vigil_store::{Database, ModelStore, TrainStatus};

use crate::error::{OrchestratorError, Result};
use crate::messages::JobMessage;
use crate::presign::Presigner;
use crate::thresholds::{ModelTrainThreshold, Thresholds};

/// Parses a six-field (seconds first) cron expression.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| OrchestratorError::Schedule {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// Maps cron fire times onto the runtime clock, anchored when `run` starts.
struct FireClock {
    wall: DateTime<Utc>,
    started: Instant,
}

impl FireClock {
    fn start() -> Self {
        Self { wall: Utc::now(), started: Instant::now() }
    }

    fn now(&self) -> DateTime<Utc> {
        self.wall + TimeDelta::from_std(self.started.elapsed()).unwrap_or_else(|_| TimeDelta::zero())
    }

    fn deadline(&self, fire_at: DateTime<Utc>) -> Instant {
        self.started + (fire_at - self.wall).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Outcome of one committed per-type pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Models moved to `in_train_process`.
    pub trained: usize,
    /// Models moved to `in_tune_process`.
    pub tuned: usize,
    /// Candidates left untouched: no artifact to tune from, or moved by
    /// someone else between the query and the update.
    pub skipped: usize,
}

/// Per model type outcomes of one tick, in processing order.
#[derive(Debug, Default)]
pub struct TickReport {
    pub passes: Vec<(String, Result<PassSummary>)>,
}

impl TickReport {
    pub fn pass(&self, model_type: &str) -> Option<&Result<PassSummary>> {
        self.passes.iter().find(|(name, _)| name == model_type).map(|(_, outcome)| outcome)
    }

    /// Jobs published by committed passes.
    pub fn dispatched(&self) -> usize {
        self.passes
            .iter()
            .filter_map(|(_, outcome)| outcome.as_ref().ok())
            .map(|summary| summary.trained + summary.tuned)
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.passes.iter().filter(|(_, outcome)| outcome.is_err()).count()
    }
}

pub struct TrainingScheduler {
    db: Database,
    store: Arc<dyn ModelStore>,
    publisher: Arc<dyn Publisher>,
    presigner: Arc<dyn Presigner>,
    thresholds: Thresholds,
    shutdown: CancellationToken,
}

impl fmt::Debug for TrainingScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingScheduler")
            .field("thresholds", &self.thresholds)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TrainingScheduler {
    pub fn new(
        db: Database,
        store: Arc<dyn ModelStore>,
        publisher: Arc<dyn Publisher>,
        presigner: Arc<dyn Presigner>,
        thresholds: Thresholds,
    ) -> Self {
        Self { db, store, publisher, presigner, thresholds, shutdown: CancellationToken::new() }
    }

    /// Uses `token` to stop the scheduler, letting it share a shutdown
    /// signal with other components.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Declares one dispatch queue per configured model type.
    pub async fn init_queues(&self) -> Result<()> {
        let queues = self.thresholds.model_types();
        self.publisher.declare_queues(&queues).await?;
        info!(queues = ?queues, "Initialized dispatch queues");
        Ok(())
    }

    /// Runs `tick` on every fire time of `schedule` until [`stop`](Self::stop)
    /// is called, and returns the number of ticks run.
    ///
    /// A tick in progress always runs to completion; fire times that pass
    /// while a tick runs are skipped.
    ///
    /// # Errors
    /// * `OrchestratorError::Schedule` - If `schedule` is not a valid cron expression
    pub async fn run(&self, schedule: &str) -> Result<u64> {
        let parsed = parse_schedule(schedule)?;
        let clock = FireClock::start();
        let mut ticks = 0_u64;
        info!(schedule, model_types = self.thresholds.len(), "Training scheduler started");

        loop {
            let Some(fire_at) = parsed.after(&clock.now()).next() else {
                warn!(schedule, "Schedule has no upcoming fire times");
                break;
            };

            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep_until(clock.deadline(fire_at)) => {}
            }

            let report = self.tick().await;
            ticks += 1;
            debug!(%fire_at, dispatched = report.dispatched(), failed = report.failed(), "Tick finished");
        }

        info!(ticks, "Training scheduler stopped");
        Ok(ticks)
    }

    /// Stops [`run`](Self::run) after the in-flight tick.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Runs one pass per configured model type.
    ///
    /// A failed pass is logged and reported; the remaining types still run.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for (model_type, threshold) in self.thresholds.iter() {
            let outcome = self.run_pass(model_type, threshold).await;
            match &outcome {
                Ok(summary) => info!(
                    model_type,
                    trained = summary.trained,
                    tuned = summary.tuned,
                    skipped = summary.skipped,
                    "Train models pass finished"
                ),
                Err(e) => error!(model_type, error = %e, "Train models pass failed, changes rolled back"),
            }
            report.passes.push((model_type.to_string(), outcome));
        }

        report
    }

    async fn run_pass(&self, model_type: &str, threshold: ModelTrainThreshold) -> Result<PassSummary> {
        let store = Arc::clone(&self.store);
        let publisher = Arc::clone(&self.publisher);
        let presigner = Arc::clone(&self.presigner);
        let model_type = model_type.to_string();

        self.db
            .within_transaction(None, move |tx| {
                Box::pin(async move {
                    let mut summary = PassSummary::default();

                    let candidates =
                        store.find_train_candidates(tx.conn(), &model_type, threshold.train_threshold)?;
                    for model in candidates {
                        let user_id = model.user_id;
                        let advanced = store.transition_status(
                            tx.conn(),
                            &user_id,
                            &model_type,
                            TrainStatus::NotTrain,
                            TrainStatus::InTrainProcess,
                        )?;
                        if !advanced {
                            warn!(user_id = %user_id, model_type = %model_type, "Train candidate changed status, skipping");
                            summary.skipped += 1;
                            continue;
                        }

                        let job = JobMessage::Train { user_id, model_type: model_type.clone() };
                        publisher.publish(&model_type, &job.to_json()?).await?;
                        debug!(user_id = %job.user_id(), model_type = %model_type, "Dispatched train job");
                        summary.trained += 1;
                    }

                    let candidates =
                        store.find_tune_candidates(tx.conn(), &model_type, threshold.tune_threshold)?;
                    for model in candidates {
                        let Some(artifact_key) = model.artifact_key else {
                            warn!(user_id = %model.user_id, model_type = %model_type, "Tune candidate has no artifact, skipping");
                            summary.skipped += 1;
                            continue;
                        };
                        let advanced = store.transition_status(
                            tx.conn(),
                            &model.user_id,
                            &model_type,
                            TrainStatus::Train,
                            TrainStatus::InTuneProcess,
                        )?;
                        if !advanced {
                            warn!(user_id = %model.user_id, model_type = %model_type, "Tune candidate changed status, skipping");
                            summary.skipped += 1;
                            continue;
                        }

                        let model_url = presigner.presign(&artifact_key).await?;
                        let job = JobMessage::Tune {
                            user_id: model.user_id,
                            model_type: model_type.clone(),
                            model_features: model.features_count,
                            model_url,
                        };
                        publisher.publish(&model_type, &job.to_json()?).await?;
                        debug!(
                            user_id = %job.user_id(),
                            model_type = %model_type,
                            model_features = model.features_count,
                            "Dispatched tune job"
                        );
                        summary.tuned += 1;
                    }

                    Ok(summary)
                })
            })
            .await
    }
}
