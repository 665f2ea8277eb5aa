//! Database connection, schema management and the unit of work.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rusqlite::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{StorageError, StorageResult};

/// Shared database handle.
///
/// Cloning is cheap; every clone talks to the same connection. Access is
/// serialized through an async mutex, so a transaction holds the connection
/// until it commits or rolls back. Anything a transaction awaits, such as a
/// broker publish, delays every other user of the handle for that long.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (or creates) a database file at `path` with initialized schema.
    ///
    /// # Errors
    /// * `StorageError::Database` - If the file cannot be opened or the schema cannot be created
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.as_ref().display(), journal_mode = %mode, "Opened database");
        Self::from_connection(conn)
    }

    /// Opens an in-memory database for testing.
    ///
    /// # Errors
    /// * `StorageError::Database` - If schema creation fails
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the connection outside of any transaction.
    ///
    /// Meant for single-statement reads and updates issued in isolation.
    pub async fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Runs `f` inside a transaction.
    ///
    /// When `scope` already carries an open transaction, `f` joins it: no
    /// nested transaction is started and an error from `f` is returned to the
    /// caller without rolling anything back. Otherwise a new transaction is
    /// begun, committed when `f` succeeds and rolled back when it fails; the
    /// error from `f` is returned unchanged.
    ///
    /// # Errors
    /// Returns the error produced by `f`, or a `StorageError` converted into
    /// `E` when beginning, committing or rolling back fails.
    pub async fn within_transaction<T, E, F>(&self, scope: Option<&mut Tx>, f: F) -> Result<T, E>
    where
        T: Send,
        E: From<StorageError> + fmt::Display + Send,
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T, E>> + Send,
    {
        if let Some(tx) = scope {
            debug!("Joining ambient transaction");
            return f(tx).await;
        }

        let mut tx = self.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().map_err(|e| {
                    error!(error = %e, "Failed to commit transaction");
                    E::from(e)
                })?;
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "Rolling back transaction");
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, "Failed to roll back transaction");
                    return Err(E::from(rollback_err));
                }
                Err(err)
            }
        }
    }

    async fn begin(&self) -> StorageResult<Tx> {
        let conn = Arc::clone(&self.conn).lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Tx { conn, open: true })
    }
}

/// An open transaction holding the shared connection.
///
/// Dropping a `Tx` that was neither committed nor rolled back (for example
/// when the owning future is cancelled) rolls it back.
pub struct Tx {
    conn: OwnedMutexGuard<Connection>,
    open: bool,
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx").field("open", &self.open).finish_non_exhaustive()
    }
}

impl Tx {
    /// Connection to run statements against.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn commit(mut self) -> StorageResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }

    fn rollback(mut self) -> StorageResult<()> {
        self.open = false;
        self.conn.execute_batch("ROLLBACK").map_err(StorageError::from)
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.open {
            match self.conn.execute_batch("ROLLBACK") {
                Ok(()) => warn!("Rolled back abandoned transaction"),
                Err(e) => error!(error = %e, "Failed to roll back abandoned transaction"),
            }
        }
    }
}

/// Creates the `models` table and its indexes.
fn init_schema(conn: &Connection) -> StorageResult<()> {
    info!("Initializing database schema");

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            user_id TEXT NOT NULL,
            model_type TEXT NOT NULL,
            features_count INTEGER NOT NULL DEFAULT 0 CHECK (features_count >= 0),
            features_count_used INTEGER NOT NULL DEFAULT 0 CHECK (features_count_used >= 0),
            train_status TEXT NOT NULL DEFAULT 'not_train'
                CHECK (train_status IN ('not_train', 'in_train_process', 'train', 'in_tune_process')),
            artifact_key TEXT,
            PRIMARY KEY (user_id, model_type)
        );

        CREATE INDEX IF NOT EXISTS idx_models_type_status ON models(model_type, train_status);
        "#,
    )?;

    Ok(())
}
