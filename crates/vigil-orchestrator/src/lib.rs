//! Vigil Orchestrator
//!
//! Drives model records through the training lifecycle:
//! - `TrainingScheduler` finds models with enough new features and dispatches
//!   train/tune jobs to one queue per model type
//! - `ResultConsumer` applies completion results from the trainer
//! - `Presigner` turns artifact keys into download URLs for tune jobs
//! - `Settings` and `Thresholds` hold the service configuration

pub mod config;
pub mod error;
pub mod messages;
pub mod presign;
pub mod scheduler;
pub mod thresholds;
pub mod updater;

pub use crate::config::Settings;
pub use error::{OrchestratorError, Result};
pub use messages::{JobMessage, ResultMessage};
pub use presign::{Presigner, S3Presigner};
pub use scheduler::{PassSummary, TickReport, TrainingScheduler, parse_schedule};
pub use thresholds::{ModelTrainThreshold, Thresholds};
pub use updater::{ConsumerStats, ResultConsumer};
