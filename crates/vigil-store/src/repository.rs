//! Model state store.
//!
//! The store is stateless: every operation receives the connection to run
//! against, which is either a `Tx` connection inside a unit of work or a
//! plain connection for isolated single-row statements.

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::models::{ModelRecord, TrainStatus};

const MODEL_COLUMNS: &str =
    "user_id, model_type, features_count, features_count_used, train_status, artifact_key";

/// Read/filter/update operations over model records.
pub trait ModelStore: Send + Sync {
    /// Creates a record in `not_train` with zeroed counters.
    fn create_model(&self, conn: &Connection, user_id: &str, model_type: &str) -> StorageResult<()>;

    /// Attributes `count` newly ingested features to a model, creating the
    /// record on first ingestion.
    fn record_features(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        count: u64,
    ) -> StorageResult<()>;

    /// Retrieves one record.
    fn get_model(&self, conn: &Connection, user_id: &str, model_type: &str)
    -> StorageResult<ModelRecord>;

    /// Retrieves every record owned by a user.
    fn list_models_for_user(&self, conn: &Connection, user_id: &str)
    -> StorageResult<Vec<ModelRecord>>;

    /// Records in `not_train` whose `features_count` reached `train_threshold`.
    fn find_train_candidates(
        &self,
        conn: &Connection,
        model_type: &str,
        train_threshold: u64,
    ) -> StorageResult<Vec<ModelRecord>>;

    /// Records in `train` whose unused features reached `tune_threshold`.
    fn find_tune_candidates(
        &self,
        conn: &Connection,
        model_type: &str,
        tune_threshold: u64,
    ) -> StorageResult<Vec<ModelRecord>>;

    /// Sets the status unconditionally.
    fn set_status(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        status: TrainStatus,
    ) -> StorageResult<()>;

    /// Moves a record from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `false` when the record has left `from` in the meantime.
    fn transition_status(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        from: TrainStatus,
        to: TrainStatus,
    ) -> StorageResult<bool>;

    /// Stores the key of the latest trained artifact.
    fn set_artifact_key(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        artifact_key: &str,
    ) -> StorageResult<()>;

    /// Records how many features the latest training consumed.
    fn set_features_count_used(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        used: u64,
    ) -> StorageResult<()>;
}

/// SQLite implementation of `ModelStore`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteModelStore;

impl SqliteModelStore {
    /// Creates a new SQLite model store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Converts a counter or threshold to SQLite's signed integer.
fn sql_count(name: &str, value: u64) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("{name} {value} exceeds the storable range")))
}

fn count_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<ModelRecord> {
    Ok(ModelRecord {
        user_id: row.get(0)?,
        model_type: row.get(1)?,
        features_count: count_column(row, 2)?,
        features_count_used: count_column(row, 3)?,
        train_status: row.get(4)?,
        artifact_key: row.get(5)?,
    })
}

fn not_found(user_id: &str, model_type: &str) -> StorageError {
    StorageError::NotFound(format!("model {model_type} of user {user_id}"))
}

/// Fails with `NotFound` when an update touched no row.
fn expect_row(rows_affected: usize, user_id: &str, model_type: &str) -> StorageResult<()> {
    if rows_affected == 0 {
        return Err(not_found(user_id, model_type));
    }
    Ok(())
}

fn query_models(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<ModelRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let models = stmt
        .query_map(params, model_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(models)
}

impl ModelStore for SqliteModelStore {
    fn create_model(&self, conn: &Connection, user_id: &str, model_type: &str) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO models (user_id, model_type) VALUES (?1, ?2)",
            params![user_id, model_type],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => StorageError::AlreadyExists(format!(
                "model {model_type} of user {user_id}"
            )),
            _ => StorageError::Database(e),
        })?;
        info!(user_id = %user_id, model_type = %model_type, "Created model");
        Ok(())
    }

    fn record_features(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        count: u64,
    ) -> StorageResult<()> {
        let delta = sql_count("feature count", count)?;
        conn.execute(
            r#"
            INSERT INTO models (user_id, model_type, features_count) VALUES (?1, ?2, ?3)
            ON CONFLICT (user_id, model_type)
            DO UPDATE SET features_count = features_count + excluded.features_count
            "#,
            params![user_id, model_type, delta],
        )?;
        debug!(user_id = %user_id, model_type = %model_type, delta = count, "Recorded features");
        Ok(())
    }

    fn get_model(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
    ) -> StorageResult<ModelRecord> {
        let sql = format!("SELECT {MODEL_COLUMNS} FROM models WHERE user_id = ?1 AND model_type = ?2");
        conn.query_row(&sql, params![user_id, model_type], model_from_row)
            .optional()?
            .ok_or_else(|| not_found(user_id, model_type))
    }

    fn list_models_for_user(
        &self,
        conn: &Connection,
        user_id: &str,
    ) -> StorageResult<Vec<ModelRecord>> {
        let sql = format!("SELECT {MODEL_COLUMNS} FROM models WHERE user_id = ?1 ORDER BY model_type");
        let models = query_models(conn, &sql, params![user_id])?;
        debug!(user_id = %user_id, count = models.len(), "Listed models for user");
        Ok(models)
    }

    fn find_train_candidates(
        &self,
        conn: &Connection,
        model_type: &str,
        train_threshold: u64,
    ) -> StorageResult<Vec<ModelRecord>> {
        let threshold = sql_count("train threshold", train_threshold)?;
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM models \
             WHERE model_type = ?1 AND train_status = ?2 AND features_count >= ?3 \
             ORDER BY user_id"
        );
        let models = query_models(
            conn,
            &sql,
            params![model_type, TrainStatus::NotTrain, threshold],
        )?;
        info!(model_type = %model_type, count = models.len(), "Found models to train");
        Ok(models)
    }

    fn find_tune_candidates(
        &self,
        conn: &Connection,
        model_type: &str,
        tune_threshold: u64,
    ) -> StorageResult<Vec<ModelRecord>> {
        let threshold = sql_count("tune threshold", tune_threshold)?;
        let sql = format!(
            "SELECT {MODEL_COLUMNS} FROM models \
             WHERE model_type = ?1 AND train_status = ?2 \
             AND features_count - features_count_used >= ?3 \
             ORDER BY user_id"
        );
        let models =
            query_models(conn, &sql, params![model_type, TrainStatus::Train, threshold])?;
        info!(model_type = %model_type, count = models.len(), "Found models to fine-tune");
        Ok(models)
    }

    fn set_status(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        status: TrainStatus,
    ) -> StorageResult<()> {
        let rows_affected = conn.execute(
            "UPDATE models SET train_status = ?3 WHERE user_id = ?1 AND model_type = ?2",
            params![user_id, model_type, status],
        )?;
        expect_row(rows_affected, user_id, model_type)?;
        debug!(user_id = %user_id, model_type = %model_type, status = %status, "Set model status");
        Ok(())
    }

    fn transition_status(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        from: TrainStatus,
        to: TrainStatus,
    ) -> StorageResult<bool> {
        if !from.can_transition_to(to) {
            return Err(StorageError::InvalidTransition {
                user_id: user_id.to_string(),
                model_type: model_type.to_string(),
                from,
                to,
            });
        }
        let rows_affected = conn.execute(
            "UPDATE models SET train_status = ?4 \
             WHERE user_id = ?1 AND model_type = ?2 AND train_status = ?3",
            params![user_id, model_type, from, to],
        )?;
        debug!(
            user_id = %user_id,
            model_type = %model_type,
            from = %from,
            to = %to,
            applied = rows_affected > 0,
            "Status transition"
        );
        Ok(rows_affected > 0)
    }

    fn set_artifact_key(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        artifact_key: &str,
    ) -> StorageResult<()> {
        let rows_affected = conn.execute(
            "UPDATE models SET artifact_key = ?3 WHERE user_id = ?1 AND model_type = ?2",
            params![user_id, model_type, artifact_key],
        )?;
        expect_row(rows_affected, user_id, model_type)?;
        info!(user_id = %user_id, model_type = %model_type, artifact_key = %artifact_key, "Set model artifact");
        Ok(())
    }

    fn set_features_count_used(
        &self,
        conn: &Connection,
        user_id: &str,
        model_type: &str,
        used: u64,
    ) -> StorageResult<()> {
        let stored = sql_count("used feature count", used)?;
        let rows_affected = conn.execute(
            "UPDATE models SET features_count_used = ?3 WHERE user_id = ?1 AND model_type = ?2",
            params![user_id, model_type, stored],
        )?;
        expect_row(rows_affected, user_id, model_type)?;
        info!(user_id = %user_id, model_type = %model_type, features_count_used = used, "Set used features");
        Ok(())
    }
}
