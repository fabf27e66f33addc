//! Retry loop for wait-style resources.
//!
//! Unlike a backoff helper, the [`Retrier`] sleeps a fixed interval between
//! attempts and keeps the bookkeeping (attempt count, elapsed time) on
//! itself so that resources can report it after the fact.

use crate::context::{Context, Interrupt};
use crate::duration::parse_duration_or;
use std::time::{Duration, Instant};

/// Default pause between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default pause before the first attempt and after success.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::ZERO;

/// Default number of attempts.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Fixed-interval retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrier {
    pub grace_period: Duration,
    pub interval: Duration,
    pub max_retry: u32,
    /// Attempts made by the last [`Retrier::retry_until`].
    pub retry_count: u32,
    /// Wall time spent in the last [`Retrier::retry_until`].
    pub duration: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            interval: DEFAULT_INTERVAL,
            max_retry: DEFAULT_MAX_RETRY,
            retry_count: 0,
            duration: Duration::ZERO,
        }
    }
}

impl Retrier {
    /// Build a retrier, using the defaults for anything left unset.
    pub fn new(
        grace_period: Option<Duration>,
        interval: Option<Duration>,
        max_retry: Option<u32>,
    ) -> Self {
        Self {
            grace_period: grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            max_retry: max_retry.unwrap_or(DEFAULT_MAX_RETRY),
            ..Self::default()
        }
    }

    /// Build a retrier from duration strings.
    ///
    /// Invalid durations fall back to the defaults with a warning.
    pub fn from_strings(
        grace_period: Option<&str>,
        interval: Option<&str>,
        max_retry: Option<u32>,
    ) -> Self {
        Self::new(
            Some(parse_duration_or(
                grace_period,
                DEFAULT_GRACE_PERIOD,
                "grace_period",
            )),
            Some(parse_duration_or(interval, DEFAULT_INTERVAL, "interval")),
            max_retry,
        )
    }

    /// Invoke `f` until it reports success or `max_retry` attempts are made.
    ///
    /// `f` returns `Ok(true)` on success; `Ok(false)` and `Err(_)` are both
    /// failed attempts. Intermediate failures are swallowed and only the last
    /// attempt's outcome is returned. The outer error is reserved for
    /// cancellation of the context during a wait.
    pub fn retry_until<E, F>(&mut self, ctx: &Context, mut f: F) -> Result<Result<bool, E>, Interrupt>
    where
        F: FnMut() -> Result<bool, E>,
    {
        let start = Instant::now();
        self.retry_count = 0;
        self.duration = Duration::ZERO;

        ctx.sleep(self.grace_period)?;

        loop {
            let attempt = f();
            self.retry_count += 1;
            self.duration = start.elapsed();

            match attempt {
                Ok(true) => {
                    ctx.sleep(self.grace_period)?;
                    return Ok(Ok(true));
                }
                failed if self.retry_count >= self.max_retry => {
                    log::debug!(
                        "giving up after {} attempts ({:?})",
                        self.retry_count,
                        self.duration
                    );
                    return Ok(failed);
                }
                _ => {
                    log::trace!("attempt {} failed, retrying in {:?}", self.retry_count, self.interval);
                    ctx.sleep(self.interval)?;
                }
            }
        }
    }
}
