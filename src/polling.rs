//! Cancellable long-polling
//!
//! Every chain adapter waits through [`long_poll`]: call a probe on a fixed
//! interval until it yields an accepted value, the time budget runs out, or
//! the caller cancels.
//!
//! Probe errors are transient by policy. They are logged and retried, and
//! only [`BridgeError::Timeout`] or [`BridgeError::Cancelled`] end the loop
//! with an error.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// Interval and time budget of a poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between attempts
    pub interval: Duration,
    /// Total budget before giving up with a timeout
    pub max_elapsed: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(20 * 60),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            interval,
            max_elapsed,
        }
    }
}

/// Poll `probe` until it returns a value accepted by `is_success`
///
/// Cancellation is checked before every attempt, raced against the attempt
/// and the sleep, and checked once more after a success so a caller that
/// abandoned the wait never receives a result. The loop times out no
/// earlier than `max_elapsed`; sleeps are clipped to the remaining budget.
pub async fn long_poll<T, F, Fut, P>(
    operation: &str,
    mut probe: F,
    is_success: P,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(operation));
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(operation)),
            outcome = probe() => outcome,
        };

        match outcome {
            Ok(Some(value)) if is_success(&value) => {
                if cancel.is_cancelled() {
                    return Err(cancelled(operation));
                }
                debug!(operation, attempt, "Poll succeeded");
                return Ok(value);
            }
            Ok(_) => {
                debug!(operation, attempt, "Poll condition not met yet");
            }
            Err(e) => {
                warn!(operation, attempt, error = %e, "Poll attempt failed, retrying");
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= config.max_elapsed {
            return Err(BridgeError::Timeout {
                operation: operation.to_string(),
                max_elapsed: config.max_elapsed,
            });
        }

        let sleep_for = config.interval.min(config.max_elapsed - elapsed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(operation)),
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
}

/// [`long_poll`] accepting the first value the probe yields
pub async fn poll_until_some<T, F, Fut>(
    operation: &str,
    probe: F,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    long_poll(operation, probe, |_| true, config, cancel).await
}

fn cancelled(operation: &str) -> BridgeError {
    BridgeError::Cancelled {
        operation: operation.to_string(),
    }
}
