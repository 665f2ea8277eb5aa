//! Vigil Store
//!
//! Persistence for per-user model records:
//! - SQLite connection and schema management (`Database`)
//! - Reentrant unit of work (`Database::within_transaction`, `Tx`)
//! - Model records and the training state machine (`ModelRecord`, `TrainStatus`)
//! - The model state store consumed by the orchestrator (`ModelStore`)

// SQL strings don't need hash-less raw strings
#![allow(clippy::needless_raw_string_hashes)]

pub mod database;
pub mod error;
pub mod models;
pub mod repository;

pub use database::{Database, Tx};
pub use error::{StorageError, StorageResult};
pub use models::{ModelRecord, TrainStatus};
pub use repository::{ModelStore, SqliteModelStore};
