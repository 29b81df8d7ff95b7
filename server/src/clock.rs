//! An injectable clock (design note, §9), so the expiry sweeper and its
//! tests do not depend on wall-clock sleeps.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// A source of the current Unix timestamp, in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// The real clock, backed by `chrono::Utc::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A manually-advanced clock for deterministic lease-expiry tests (§8, S3).
#[derive(Debug)]
pub struct TestClock(AtomicI64);

impl TestClock {
    pub fn new(now: i64) -> Self {
        TestClock(AtomicI64::new(now))
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
