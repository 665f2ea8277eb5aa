//! Layered service settings.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults (`config/default.toml`)
//! 2. `vigil.toml` in the working directory, if present
//! 3. The file passed with `--config`, if any
//! 4. Environment variables such as `VIGIL__BROKER__URL`

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use vigil_broker::{AckMode, AmqpConfig};

use crate::error::{OrchestratorError, Result};
use crate::scheduler::parse_schedule;

const DEFAULTS: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub broker: BrokerSettings,
    pub trainer: TrainerSettings,
    pub updater: UpdaterSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    pub url: String,
    /// Idle channels kept open for reuse.
    pub pool_size: usize,
    pub connect_attempts: u32,
    pub connect_delay_secs: u64,
    /// Settle results on delivery instead of after they are applied.
    pub auto_ack: bool,
}

impl BrokerSettings {
    pub fn amqp_config(&self) -> AmqpConfig {
        AmqpConfig {
            url: self.url.clone(),
            pool_size: self.pool_size,
            connect_attempts: self.connect_attempts,
            connect_delay: Duration::from_secs(self.connect_delay_secs),
            ack_mode: if self.auto_ack { AckMode::OnDelivery } else { AckMode::Manual },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainerSettings {
    /// Six-field cron expression, seconds first.
    pub cron: String,
    pub thresholds_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdaterSettings {
    pub result_queue: String,
    /// Pause before a result whose transaction failed goes back on the queue.
    pub requeue_delay_ms: u64,
}

impl UpdaterSettings {
    pub const fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    pub allow_http: bool,
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Settings {
    /// Loads settings from every source and validates them.
    ///
    /// # Errors
    /// * `OrchestratorError::Config` - If a source cannot be read or parsed
    /// * `OrchestratorError::Settings` - If a value is out of range
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULTS, FileFormat::Toml))
            .add_source(File::with_name("vigil").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("VIGIL").prefix_separator("__").separator("__").try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.pool_size == 0 {
            return Err(OrchestratorError::Settings("broker.pool_size must be at least 1".to_string()));
        }
        if self.updater.result_queue.trim().is_empty() {
            return Err(OrchestratorError::Settings("updater.result_queue must not be empty".to_string()));
        }
        if self.storage.presign_ttl_secs == 0 {
            return Err(OrchestratorError::Settings("storage.presign_ttl_secs must be positive".to_string()));
        }
        parse_schedule(&self.trainer.cron)?;
        Ok(())
    }
}
