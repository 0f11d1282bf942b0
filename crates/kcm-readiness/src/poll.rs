//! Deadline-bounded convergence polling
//!
//! A [`ConvergenceCheck`] evaluates the whole cluster from scratch on every
//! tick and says whether it is ready, not ready yet, or broken for good.
//! [`await_convergence`] drives it: first tick immediately, then one tick per
//! interval until it passes, it reports a fatal reason, or the timeout budget
//! is spent. Nothing from an earlier tick is reused by a later one, so a
//! target that regresses after looking ready is caught on the next pass.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::Clock;
use kcm_common::Error;

/// Default overall budget for one convergence wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// Default spacing between ticks
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of a single pass over the cluster
#[derive(Debug, PartialEq, Eq)]
pub enum Tick<R> {
    /// Everything checked is converged
    Ready,
    /// Not converged yet; try again next tick
    Pending(R),
    /// Will never converge; stop polling
    Fatal(R),
}

/// A failure reason that can be logged with structured fields
pub trait Diagnostic: fmt::Display + fmt::Debug + Send {
    /// What failed (target or object name)
    fn subject(&self) -> &str;
    /// Short machine-friendly failure kind, e.g. `NotReady`
    fn kind(&self) -> &'static str;
}

/// A unit of work the poller re-runs until it converges
#[async_trait]
pub trait ConvergenceCheck: Send + Sync {
    /// Failure reason reported by a non-ready tick
    type Reason: Diagnostic;

    /// What is being waited for, for logs and timeout messages
    fn description(&self) -> String;

    /// Evaluate current cluster state
    async fn tick(&self) -> Tick<Self::Reason>;
}

/// Timing for one convergence wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up once this much time has passed without a ready tick
    pub timeout: Duration,
    /// Pause between the end of one tick and the start of the next
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Validated timing; both durations must be non-zero
    pub fn new(timeout: Duration, interval: Duration) -> Result<Self, Error> {
        if timeout.is_zero() {
            return Err(Error::config_for_field("timeout", "must be greater than zero"));
        }
        if interval.is_zero() {
            return Err(Error::config_for_field(
                "poll interval",
                "must be greater than zero",
            ));
        }
        Ok(Self { timeout, interval })
    }
}

/// How a successful wait went
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollReport {
    /// Ticks run, including the ready one
    pub attempts: u32,
    /// Time from the first tick to convergence
    pub elapsed: Duration,
}

/// Why a wait ended without convergence
#[derive(Debug, Error)]
pub enum PollError<R: Diagnostic> {
    /// The budget ran out; `last` is the most recent reason seen
    #[error("timed out after {elapsed:?} ({attempts} attempts) waiting for {check}{}", last_reason(.last))]
    TimedOut {
        /// What was being waited for
        check: String,
        /// Ticks run
        attempts: u32,
        /// Time spent
        elapsed: Duration,
        /// Most recent not-ready reason
        last: Option<R>,
    },

    /// A tick reported a failure that cannot resolve by waiting
    #[error("{check} cannot converge: {reason}")]
    Aborted {
        /// What was being waited for
        check: String,
        /// Ticks run
        attempts: u32,
        /// The fatal reason
        reason: R,
    },
}

fn last_reason<R: fmt::Display>(last: &Option<R>) -> String {
    last.as_ref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl<R: Diagnostic> PollError<R> {
    /// The reason that blocked convergence, if any tick reported one
    pub fn reason(&self) -> Option<&R> {
        match self {
            Self::TimedOut { last, .. } => last.as_ref(),
            Self::Aborted { reason, .. } => Some(reason),
        }
    }

    /// Ticks run before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::TimedOut { attempts, .. } | Self::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Run `check` until it converges, aborts, or `config.timeout` elapses.
///
/// The deadline is only evaluated between ticks: a tick that starts before the
/// deadline always finishes, so the wait can overrun by one tick's latency.
/// The sleep before the next tick is clipped to the remaining budget, so an
/// interval longer than the timeout does not stretch the wait.
pub async fn await_convergence<C, K>(
    check: &C,
    clock: &K,
    config: &PollConfig,
) -> Result<PollReport, PollError<C::Reason>>
where
    C: ConvergenceCheck + ?Sized,
    K: Clock + ?Sized,
{
    let description = check.description();
    let start = clock.now();
    let mut attempts = 0u32;
    let mut last = None;

    loop {
        attempts += 1;
        match check.tick().await {
            Tick::Ready => {
                let elapsed = clock.now().saturating_duration_since(start);
                info!(
                    check = %description,
                    attempts,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "converged"
                );
                return Ok(PollReport { attempts, elapsed });
            }
            Tick::Pending(reason) => {
                warn!(
                    check = %description,
                    attempt = attempts,
                    subject = %reason.subject(),
                    kind = reason.kind(),
                    "not converged: {reason}"
                );
                last = Some(reason);
            }
            Tick::Fatal(reason) => {
                error!(
                    check = %description,
                    attempt = attempts,
                    subject = %reason.subject(),
                    kind = reason.kind(),
                    "cannot converge: {reason}"
                );
                return Err(PollError::Aborted {
                    check: description,
                    attempts,
                    reason,
                });
            }
        }

        let elapsed = clock.now().saturating_duration_since(start);
        let Some(remaining) = config.timeout.checked_sub(elapsed).filter(|r| !r.is_zero()) else {
            return Err(PollError::TimedOut {
                check: description,
                attempts,
                elapsed,
                last,
            });
        };

        clock.sleep(config.interval.min(remaining)).await;

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= config.timeout {
            return Err(PollError::TimedOut {
                check: description,
                attempts,
                elapsed,
                last,
            });
        }
    }
}
