//! Cancellation context threaded through every check and apply
//!
//! A [`Context`] is a cheap, cloneable handle. Resources poll it before each
//! syscall boundary, sleep on it instead of `thread::sleep`, and run blocking
//! collaborators (DBus round-trips, dials) through [`Context::run`] so that a
//! cancellation resolves immediately even while the collaborator is stuck.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How often [`Context::run`] re-checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Why a blocking wait ended without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    #[error("context was cancelled")]
    Cancelled,
    #[error("worker exited without a result")]
    Abandoned,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// A cancellation token
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the context and wake every sleeper
    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail fast if the context has been cancelled
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early on cancellation
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        if duration.is_zero() {
            return self.check();
        }

        let deadline = Instant::now() + duration;
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            cancelled = self
                .inner
                .wake
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Err(Interrupt::Cancelled)
    }

    /// Run a blocking operation on a worker thread, returning as soon as it
    /// finishes or the context is cancelled
    ///
    /// A cancelled worker is abandoned, not killed: whatever it already
    /// issued to the OS stands.
    pub fn run<T, F>(&self, f: F) -> Result<T, Interrupt>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.check()?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // receiver may be gone after a cancellation
            let _ = tx.send(f());
        });

        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(value) => return Ok(value),
                Err(RecvTimeoutError::Timeout) => self.check()?,
                Err(RecvTimeoutError::Disconnected) => return Err(Interrupt::Abandoned),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes() {
        let ctx = Context::new();
        let start = Instant::now();
        ctx.sleep(Duration::from_millis(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(ctx.sleep(Duration::from_secs(30)), Err(Interrupt::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_run_returns_value() {
        let ctx = Context::new();
        assert_eq!(ctx.run(|| 40 + 2), Ok(42));
    }

    #[test]
    fn test_run_cancelled_while_blocked() {
        let ctx = Context::new();
        let canceller = ctx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let result = ctx.run(|| {
            thread::sleep(Duration::from_secs(2));
            1
        });
        assert_eq!(result, Err(Interrupt::Cancelled));
    }

    #[test]
    fn test_cancelled_before_start() {
        let ctx = Context::new();
        ctx.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.check(), Err(Interrupt::Cancelled));
        assert_eq!(ctx.run(|| 1), Err(Interrupt::Cancelled));
    }
}
