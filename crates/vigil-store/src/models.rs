//! Model records and the training state machine.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Training status of a model record.
///
/// ```text
/// not_train --(train threshold)--> in_train_process --(completion)--> train
/// train --(tune threshold)--> in_tune_process --(completion)--> train
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainStatus {
    /// Initial state, never trained.
    NotTrain,
    /// A training job has been dispatched.
    InTrainProcess,
    /// A trained artifact is available.
    Train,
    /// A fine-tune job has been dispatched.
    InTuneProcess,
}

impl TrainStatus {
    /// All statuses in state machine order.
    pub const ALL: [Self; 4] = [Self::NotTrain, Self::InTrainProcess, Self::Train, Self::InTuneProcess];

    /// Returns the persisted name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotTrain => "not_train",
            Self::InTrainProcess => "in_train_process",
            Self::Train => "train",
            Self::InTuneProcess => "in_tune_process",
        }
    }

    /// Checks if a record can move from this status to `to`.
    ///
    /// Completions are accepted from either in-process status; the same
    /// status is always a valid (no-op) transition.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm is a distinct edge of the state machine
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::NotTrain, Self::InTrainProcess) => true,
            (Self::InTrainProcess | Self::InTuneProcess, Self::Train) => true,
            (Self::Train, Self::InTuneProcess) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    /// Returns `true` while a job for the record is outstanding.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::InTrainProcess | Self::InTuneProcess)
    }
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown train status '{s}'"))
    }
}

impl ToSql for TrainStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TrainStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_str()?;
        raw.parse().map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// Persisted state of one (user, model type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Owner of the model.
    pub user_id: String,
    /// Model type identifier (also the job queue name).
    pub model_type: String,
    /// Total feature rows attributed to the model.
    pub features_count: u64,
    /// Feature rows consumed by the most recent completed training.
    pub features_count_used: u64,
    /// Current training status.
    pub train_status: TrainStatus,
    /// Storage key of the latest trained artifact.
    pub artifact_key: Option<String>,
}

impl ModelRecord {
    /// Feature rows not yet consumed by a training run.
    #[must_use]
    pub const fn unused_features(&self) -> u64 {
        self.features_count.saturating_sub(self.features_count_used)
    }
}
