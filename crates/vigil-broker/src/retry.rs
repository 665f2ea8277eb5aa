//! Bounded retries for connection establishment.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Runs `f` until it succeeds or `attempts` runs have failed, sleeping
/// `delay` between runs. Returns the last error on exhaustion.
///
/// `attempts` of zero is treated as one.
pub async fn do_with_tries<T, E, F, Fut>(mut f: F, attempts: u32, delay: Duration) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt, attempts, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
