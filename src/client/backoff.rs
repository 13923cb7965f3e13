use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{Error, Result};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Shared flag a caller flips to abort an in-flight query.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub trait Sleeper: Send + Sync {
    /// Waits for `delay` unless `cancel` fires first.
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<()>;
}

/// Blocks the calling thread, waking up regularly to look at the cancel flag.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration, cancel: &CancelToken) -> Result<()> {
        let deadline = Instant::now() + delay;
        loop {
            cancel.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Linear-in-attempt delays; rate limiting additionally has a floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_tries: u32,
    pub base_delay: Duration,
    pub rate_limit_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_tries: 3,
            base_delay: Duration::from_millis(1250),
            rate_limit_floor: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after the zero-based `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    pub fn rate_limited_delay(&self, attempt: u32) -> Duration {
        self.delay(attempt).max(self.rate_limit_floor)
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt + 1 >= self.max_tries
    }
}
