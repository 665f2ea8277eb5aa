//! Tracing subscriber setup.

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use vigil_orchestrator::config::LoggingSettings;

/// Installs the global subscriber.
///
/// Events go to stderr so command output on stdout stays parseable.
/// Filter precedence: `--log-level`, then `RUST_LOG`, then `logging.level`.
pub fn init(settings: &LoggingSettings, log_level: Option<&str>) -> anyhow::Result<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level),
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&settings.level)),
    }
    .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if settings.json {
        registry.with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false).with_writer(std::io::stderr)).try_init()
    }
    .context("Failed to install tracing subscriber")
}
