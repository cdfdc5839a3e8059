//! Write retry while SQLite reports lock contention
//!
//! `busy_timeout` covers most contention inside SQLite itself. A writer can
//! still see `database is locked` when a WAL checkpoint or a second process
//! holds the lock past that timeout; [`LockRetry`] retries those writes with
//! doubling delays until its budget runs out.

use crate::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry policy for writes that fail with SQLite lock errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetry {
    /// Total time spent retrying before giving up
    pub budget: Duration,
    /// Delay before the first retry
    pub first_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self::with_budget_ms(5000)
    }
}

impl LockRetry {
    pub fn with_budget_ms(budget_ms: u64) -> Self {
        Self {
            budget: Duration::from_millis(budget_ms),
            first_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }

    /// Run `write` until it succeeds, fails with a non-lock error, or the budget is spent
    pub async fn run<F, Fut, T>(&self, key: &str, mut write: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut delay = self.first_delay;
        let mut retries = 0u32;

        loop {
            let err = match write().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(
                            key,
                            retries,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Write landed after lock contention"
                        );
                    }
                    return Ok(value);
                }
                Err(err) if is_lock_error(&err) => err,
                Err(err) => return Err(err),
            };

            let waited = started.elapsed();
            if waited + delay > self.budget {
                warn!(
                    key,
                    retries,
                    waited_ms = waited.as_millis() as u64,
                    "Giving up on locked write"
                );
                return Err(Error::Internal(format!(
                    "write to {key} still locked after {retries} retries: {err}"
                )));
            }

            retries += 1;
            debug!(
                key,
                retries,
                delay_ms = delay.as_millis() as u64,
                "Database locked, retrying write"
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_delay);
        }
    }
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
            matches!(
                db_err.code().and_then(|code| code.parse::<i32>().ok()).map(|code| code & 0xff),
                Some(5) | Some(6)
            ) || db_err.message().contains("locked")
        }
        Error::Database(other) => other.to_string().contains("database is locked"),
        _ => false,
    }
}
