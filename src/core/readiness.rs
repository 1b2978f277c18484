//! Bounded readiness waits for objects that live in another browsing context.
//!
//! Construction of the embedded runtime is not observable from outside the
//! frame, so readiness is probed. A [`ReadinessWait`] re-checks a probe no
//! more often than the policy interval, gives up after `max_attempts` with
//! [`ButterError::Timeout`], and stops early once its [`CancelToken`] is
//! cancelled (the owning session or document generation went away).
//!
//! # Usage
//! ```ignore
//! let mut wait = ReadinessWait::new("runtime for media-0", policy, token.clone());
//! // In update loop:
//! match wait.poll(|| frame.runtime(media)) {
//!     Ok(Some(rt)) => apply(rt),
//!     Ok(None) => {}            // not yet, try next tick
//!     Err(e) => log::warn!("{}", e),
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ButterError, ButterResult};

/// Retry interval and cap for readiness probing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { interval_ms: 10, max_attempts: 500 }
    }
}

impl RetryPolicy {
    pub fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self { interval_ms, max_attempts: max_attempts.max(1) }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Cancellation flag shared between an owner and its pending waits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One pending readiness check.
#[derive(Debug, Clone)]
pub struct ReadinessWait {
    what: String,
    policy: RetryPolicy,
    token: CancelToken,
    attempts: u32,
    next_check: Instant,
}

impl ReadinessWait {
    /// The first poll probes immediately.
    pub fn new(what: impl Into<String>, policy: RetryPolicy, token: CancelToken) -> Self {
        Self {
            what: what.into(),
            policy,
            token,
            attempts: 0,
            next_check: Instant::now(),
        }
    }

    pub fn what(&self) -> &str {
        &self.what
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Probe if the interval elapsed.
    ///
    /// Returns `Ok(Some(v))` when ready, `Ok(None)` when not ready (or not due),
    /// and an error once cancelled or out of attempts.
    pub fn poll<T>(&mut self, probe: impl FnOnce() -> Option<T>) -> ButterResult<Option<T>> {
        if self.token.is_cancelled() {
            return Err(ButterError::Cancelled(self.what.clone()));
        }
        let now = Instant::now();
        if now < self.next_check {
            return Ok(None);
        }
        self.attempts += 1;
        if let Some(v) = probe() {
            log::trace!("ReadinessWait: '{}' ready after {} attempts", self.what, self.attempts);
            return Ok(Some(v));
        }
        if self.attempts >= self.policy.max_attempts {
            log::warn!("ReadinessWait: '{}' timed out after {} attempts", self.what, self.attempts);
            return Err(ButterError::Timeout { what: self.what.clone(), attempts: self.attempts });
        }
        self.next_check = now + self.policy.interval();
        Ok(None)
    }

    /// Probe until ready, sleeping between attempts. For hosts without a tick loop.
    pub fn block_on<T>(&mut self, mut probe: impl FnMut() -> Option<T>) -> ButterResult<T> {
        loop {
            if let Some(v) = self.poll(&mut probe)? {
                return Ok(v);
            }
            let wait = self.next_check.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_first_probe() {
        let mut wait = ReadinessWait::new("x", RetryPolicy::default(), CancelToken::new());
        assert_eq!(wait.poll(|| Some(5)).unwrap(), Some(5));
        assert_eq!(wait.attempts(), 1);
    }

    #[test]
    fn test_not_due_before_interval() {
        let mut wait = ReadinessWait::new("x", RetryPolicy::new(10_000, 5), CancelToken::new());
        assert_eq!(wait.poll(|| None::<()>).unwrap(), None);
        // Second poll is inside the interval: probe must not run
        let mut probed = false;
        assert_eq!(
            wait.poll(|| {
                probed = true;
                Some(())
            })
            .unwrap(),
            None
        );
        assert!(!probed);
        assert_eq!(wait.attempts(), 1);
    }

    #[test]
    fn test_times_out_after_cap() {
        let mut wait = ReadinessWait::new("runtime", RetryPolicy::new(0, 3), CancelToken::new());
        assert_eq!(wait.poll(|| None::<()>).unwrap(), None);
        assert_eq!(wait.poll(|| None::<()>).unwrap(), None);
        assert_eq!(
            wait.poll(|| None::<()>).unwrap_err(),
            ButterError::Timeout { what: "runtime".into(), attempts: 3 }
        );
    }

    #[test]
    fn test_cancelled_wait_stops() {
        let token = CancelToken::new();
        let mut wait = ReadinessWait::new("frame", RetryPolicy::new(0, 100), token.clone());
        assert_eq!(wait.poll(|| None::<()>).unwrap(), None);
        token.cancel();
        assert!(wait.is_cancelled());
        assert_eq!(wait.poll(|| Some(())).unwrap_err(), ButterError::Cancelled("frame".into()));
    }

    #[test]
    fn test_block_on() {
        let mut n = 0;
        let mut wait = ReadinessWait::new("counter", RetryPolicy::new(1, 10), CancelToken::new());
        let v = wait
            .block_on(|| {
                n += 1;
                (n == 3).then_some(n)
            })
            .unwrap();
        assert_eq!(v, 3);
        assert_eq!(wait.attempts(), 3);
    }
}
