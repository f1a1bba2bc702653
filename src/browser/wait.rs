//! Condition waits with an explicit timeout and polling interval.
//!
//! A wait never raises on its own: it reports [`WaitOutcome::Ready`] or
//! [`WaitOutcome::TimedOut`], and the call site decides through its
//! [`TimeoutPolicy`] whether an expired wait is an error.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use tracing::warn;

use crate::error::ScrapeError;

/// How long to wait and how often to re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub timeout: Duration,
    pub interval: Duration,
}

impl WaitSpec {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub const fn millis(timeout: u64, interval: u64) -> Self {
        Self::new(
            Duration::from_millis(timeout),
            Duration::from_millis(interval),
        )
    }
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self::millis(10_000, 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    Ready(T),
    TimedOut { waited: Duration },
}

impl<T> WaitOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// What an expired wait means at a given call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Raise [`ScrapeError::Timeout`].
    #[default]
    Fail,
    /// Log and let the caller carry on without a value.
    Skip,
}

/// A wait bound together with the policy of the call site that uses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitRule {
    pub spec: WaitSpec,
    pub policy: TimeoutPolicy,
}

impl WaitRule {
    pub const fn new(spec: WaitSpec, policy: TimeoutPolicy) -> Self {
        Self { spec, policy }
    }

    /// Apply this rule's policy to an outcome.
    ///
    /// `Ok(Some(_))` when ready, `Ok(None)` when the wait expired under
    /// [`TimeoutPolicy::Skip`], and a [`ScrapeError::Timeout`] otherwise.
    pub fn resolve<T>(&self, outcome: WaitOutcome<T>, what: &str) -> Result<Option<T>> {
        match outcome {
            WaitOutcome::Ready(value) => Ok(Some(value)),
            WaitOutcome::TimedOut { waited } => match self.policy {
                TimeoutPolicy::Fail => Err(ScrapeError::Timeout {
                    what: what.to_string(),
                    waited,
                }
                .into()),
                TimeoutPolicy::Skip => {
                    warn!("Gave up waiting for {} after {:?}", what, waited);
                    Ok(None)
                }
            },
        }
    }
}

/// Poll `probe` until it yields a value or `spec.timeout` elapses.
///
/// The probe is always evaluated at least once, so a zero timeout still
/// observes a condition that already holds.
pub async fn wait_until<T, F, Fut>(spec: WaitSpec, mut probe: F) -> WaitOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return WaitOutcome::Ready(value);
        }

        let waited = start.elapsed();
        if waited >= spec.timeout {
            return WaitOutcome::TimedOut { waited };
        }

        tokio::time::sleep(spec.interval.min(spec.timeout - waited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ready_once_the_probe_succeeds() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let outcome = wait_until(WaitSpec::millis(1_000, 1), move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            (n >= 3).then_some(n)
        })
        .await;

        assert_eq!(outcome, WaitOutcome::Ready(3));
    }

    #[tokio::test]
    async fn times_out_instead_of_looping_forever() {
        let outcome: WaitOutcome<()> = wait_until(WaitSpec::millis(30, 5), || async { None }).await;

        match outcome {
            WaitOutcome::TimedOut { waited } => assert!(waited >= Duration::from_millis(30)),
            WaitOutcome::Ready(()) => panic!("probe never succeeds"),
        }
    }

    #[tokio::test]
    async fn zero_timeout_still_probes_once() {
        let outcome = wait_until(WaitSpec::millis(0, 10), || async { Some("here") }).await;
        assert!(outcome.is_ready());
    }

    #[test]
    fn fail_policy_raises_timeout() {
        let rule = WaitRule::new(WaitSpec::default(), TimeoutPolicy::Fail);
        let err = rule
            .resolve::<()>(
                WaitOutcome::TimedOut {
                    waited: Duration::from_secs(10),
                },
                "current page 2",
            )
            .unwrap_err();

        let scrape = err.downcast_ref::<ScrapeError>().unwrap();
        assert!(scrape.is_timeout());
        assert!(err.to_string().contains("current page 2"));
    }

    #[test]
    fn skip_policy_yields_nothing() {
        let rule = WaitRule::new(WaitSpec::default(), TimeoutPolicy::Skip);
        let resolved = rule
            .resolve::<()>(
                WaitOutcome::TimedOut {
                    waited: Duration::from_secs(1),
                },
                "detail heading",
            )
            .unwrap();
        assert!(resolved.is_none());

        let ready = rule.resolve(WaitOutcome::Ready(7), "x").unwrap();
        assert_eq!(ready, Some(7));
    }
}
