//! Jittered exponential backoff for reaching the management cluster.
//!
//! A freshly created kind cluster refuses connections for a while after
//! `make test-apply` returns. [`with_backoff`] repeats a call while its error
//! is transient and gives up at once on one that is not, so a missing
//! kubeconfig fails immediately while a refused connection is retried.
//! Convergence polling does not use this; it has a fixed interval and a hard
//! deadline.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::Error;

/// Retry schedule: `attempts` calls, delays doubling from `base` up to `cap`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    attempts: u32,
    base: Duration,
    cap: Duration,
}

impl Backoff {
    /// Schedule for the suite's first API call
    pub const CONNECT: Backoff = Backoff {
        attempts: 10,
        base: Duration::from_millis(500),
        cap: Duration::from_secs(15),
    };

    /// Validated schedule; `attempts` and `base` must be non-zero
    pub fn new(attempts: u32, base: Duration, cap: Duration) -> Result<Self, Error> {
        if attempts == 0 {
            return Err(Error::config_for_field("attempts", "must be at least 1"));
        }
        if base.is_zero() {
            return Err(Error::config_for_field("base delay", "must be greater than zero"));
        }
        Ok(Self {
            attempts,
            base,
            cap: cap.max(base),
        })
    }

    /// Total calls before giving up
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Un-jittered delay after failed call number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << doublings)
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

/// Call `operation` until it succeeds, fails permanently, or runs out of
/// attempts.
///
/// An error for which `transient` returns false is returned at once. Each
/// delay from [`Backoff::delay_after`] is scaled by a random factor in
/// `[0.5, 1.5)` so parallel CI jobs do not retry in lockstep. When attempts
/// run out the last error is returned.
pub async fn with_backoff<K, F, Fut, P, T, E>(
    backoff: &Backoff,
    clock: &K,
    operation_name: &str,
    transient: P,
    mut operation: F,
) -> Result<T, E>
where
    K: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !transient(&err) {
            error!(operation = %operation_name, attempt, error = %err, "permanent failure, not retrying");
            return Err(err);
        }
        if attempt >= backoff.attempts {
            error!(operation = %operation_name, attempt, error = %err, "out of attempts");
            return Err(err);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let pause = backoff.delay_after(attempt).mul_f64(jitter);
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = pause.as_millis() as u64,
            "transient failure, retrying"
        );
        clock.sleep(pause).await;
    }
}
