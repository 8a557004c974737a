/* Any copyright is dedicated to the Public Domain.
http://creativecommons.org/publicdomain/zero/1.0/ */

use crate::client::TestClient;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Default bound for a single convergence wait. Convergence here is driven
/// synchronously, so hitting this means something is genuinely wrong.
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub type TestFn = fn(&mut TestClient, &mut TestClient);

pub struct TestGroup {
    pub name: String,
    pub tests: Vec<(&'static str, TestFn)>,
}

impl TestGroup {
    pub fn new(name: &str, tests: Vec<(&'static str, TestFn)>) -> Self {
        TestGroup {
            name: name.into(),
            tests,
        }
    }
}

/// A convergence wait that ran out of time. Deliberately a different type
/// from a plain assertion failure: when a test dies with one of these, the
/// two sides never agreed, as opposed to agreeing on the wrong value. Carries
/// whatever the check last observed.
#[derive(Debug)]
pub struct WaitError {
    pub last_seen: String,
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out waiting for convergence; last seen: {}",
            self.last_seen
        )
    }
}

impl std::error::Error for WaitError {}

/// Re-run `check` until it reports convergence or `timeout` elapses. The
/// check returns `Err(description)` while unconverged; the final description
/// is reported on timeout. Used for client-side state, which has no condvar
/// to block on - server-side waits should go through
/// `FakeServerHandle::wait_until` instead.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> Result<(), WaitError>
where
    F: FnMut() -> Result<(), String>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let last_seen = match check() {
            Ok(()) => return Ok(()),
            Err(seen) => seen,
        };
        if Instant::now() >= deadline {
            return Err(WaitError { last_seen });
        }
        thread::sleep(interval);
    }
}

/// `poll_until` with the default timeout and interval.
pub fn poll_short<F>(check: F) -> Result<(), WaitError>
where
    F: FnMut() -> Result<(), String>,
{
    poll_until(SHORT_TIMEOUT, POLL_INTERVAL, check)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_succeeds_on_first_match() {
        let mut calls = 0;
        poll_until(Duration::from_millis(200), Duration::from_millis(10), || {
            calls += 1;
            if calls >= 3 {
                Ok(())
            } else {
                Err(format!("only {} calls", calls))
            }
        })
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_poll_until_reports_last_seen() {
        let err = poll_until(Duration::from_millis(50), Duration::from_millis(10), || {
            Err("count is 0".to_string())
        })
        .unwrap_err();
        assert_eq!(err.last_seen, "count is 0");
    }
}
