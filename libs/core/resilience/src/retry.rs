//! Policy-driven retry with exponential backoff.
//!
//! This module provides:
//! - `RetryPolicy` - backoff shape plus the set of error kinds worth retrying
//! - bundled profiles for the three operation classes (discovery, analysis,
//!   storage)
//! - `retry_with_policy` - the retry loop itself, with jittered sleeps that
//!   observe the caller's cancellation scope
//!
//! # Example
//!
//! ```rust,ignore
//! use resilience::{retry_with_policy, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//!
//! let policy = RetryPolicy::storage().with_max_retries(5);
//! let cancel = CancellationToken::new();
//!
//! let rows = retry_with_policy(&policy, &cancel, || async {
//!     store.get_resources(&filter).await
//! })
//! .await?;
//! ```

use crate::error::{ErrorKind, ScanError, ScanResult};
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Backoff configuration for one class of operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Multiplier applied per attempt (typically 2.0).
    pub backoff_factor: f64,

    /// Jitter fraction: each delay is perturbed uniformly within
    /// ±(fraction · delay). `None` disables jitter.
    pub jitter: Option<f64>,

    /// Error kinds eligible for retry under this policy. Eligibility is
    /// combined with the taxonomy classification: a kind listed here still
    /// only retries when [`ScanError::is_retryable`] agrees.
    pub retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            jitter: Some(0.25),
            retryable_kinds: HashSet::from([
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::Timeout,
            ]),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the default shape (3 retries, 100ms → 5s).
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile for provider-facing discovery calls: patient, and willing to
    /// retry provider-kind errors whose cause looks transient.
    pub fn discovery() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: Some(0.25),
            retryable_kinds: HashSet::from([
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::Timeout,
                ErrorKind::Provider,
            ]),
        }
    }

    /// Profile for analysis passes over already-fetched data.
    pub fn analysis() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: Some(0.25),
            retryable_kinds: HashSet::from([
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::Timeout,
            ]),
        }
    }

    /// Profile for inventory store operations.
    pub fn storage() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            jitter: Some(0.25),
            retryable_kinds: HashSet::from([ErrorKind::Storage, ErrorKind::Timeout]),
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Disable jitter (deterministic delays, mainly for tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = None;
        self
    }

    /// Replace the set of retry-eligible kinds.
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Whether the given error should be retried under this policy.
    pub fn should_retry(&self, error: &ScanError) -> bool {
        self.retryable_kinds.contains(&error.kind()) && error.is_retryable()
    }

    /// The un-jittered delay for a given attempt:
    /// `min(initial · factor^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt);
        match self.jitter {
            Some(fraction) if fraction > 0.0 => apply_jitter(base, fraction),
            _ => base,
        }
    }
}

/// Perturb a delay uniformly within ±(fraction · delay).
///
/// Drawn from `rand::rng()`, which is a CSPRNG, so concurrent workers do not
/// fall into lockstep even when seeded by the same scheduler tick.
fn apply_jitter(delay: Duration, fraction: f64) -> Duration {
    let offset: f64 = rand::rng().random_range(-fraction..=fraction);
    let millis = delay.as_millis() as f64 * (1.0 + offset);
    Duration::from_millis(millis.max(0.0) as u64)
}

/// Run `operation` under the given policy.
///
/// Non-retryable failures surface immediately. Retryable failures sleep for
/// the jittered backoff delay, racing the caller's cancellation scope: if
/// the scope fires, the cancellation error is returned (never "max retries
/// exceeded"). Once `max_retries` retries are spent, the last error is
/// surfaced wrapped so callers can still see the original via `source()`.
pub async fn retry_with_policy<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> ScanResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScanResult<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ScanError::cancelled());
        }

        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(error) => {
                if !policy.should_retry(&error) {
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "giving up after max retries"
                    );
                    let kind = error.kind();
                    return Err(ScanError::new(
                        kind,
                        format!("max retries exceeded after {} attempts", attempt + 1),
                    )
                    .with_source(error));
                }

                // A rate-limited upstream may know better than our backoff curve.
                let delay = error
                    .retry_after()
                    .unwrap_or_else(|| policy.jittered_delay(attempt));

                debug!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "operation failed, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(ScanError::cancelled()),
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing_then_ok(
        failures: u32,
        counter: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = ScanResult<&'static str>> + Send>>
    {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(ScanError::network("connection reset"))
                } else {
                    Ok("success")
                }
            })
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result = retry_with_policy(
            &RetryPolicy::default(),
            &cancel,
            failing_then_ok(0, counter.clone()),
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_on_attempt_after_k_failures() {
        // Retry law: K retryable failures with K <= max_retries succeed on
        // attempt K + 1.
        for k in 1..=3u32 {
            let counter = Arc::new(AtomicU32::new(0));
            let cancel = CancellationToken::new();
            let policy = RetryPolicy::default()
                .with_initial_delay(Duration::from_millis(10))
                .without_jitter();

            let result =
                retry_with_policy(&policy, &cancel, failing_then_ok(k, counter.clone())).await;

            assert_eq!(result.unwrap(), "success");
            assert_eq!(counter.load(Ordering::SeqCst), k + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_delay_within_jitter_bounds() {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_max_retries(4)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300));

        let start = tokio::time::Instant::now();
        let result =
            retry_with_policy(&policy, &cancel, failing_then_ok(4, counter.clone())).await;
        let elapsed = start.elapsed();

        assert_eq!(result.unwrap(), "success");

        // delays: 100, 200, min(400,300)=300, min(800,300)=300 => 900ms total
        let expected = Duration::from_millis(900);
        assert!(elapsed >= expected.mul_f64(0.75), "elapsed {elapsed:?}");
        assert!(elapsed <= expected.mul_f64(1.25), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: ScanResult<()> =
            retry_with_policy(&RetryPolicy::default(), &cancel, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ScanError::auth("denied"))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Auth);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_kind_outside_policy_set_surfaces_immediately() {
        // storage profile does not retry network errors even though the
        // taxonomy marks them retryable.
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let result: ScanResult<()> = retry_with_policy(&RetryPolicy::storage(), &cancel, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ScanError::network("connection refused"))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_max_retries_exceeded_wraps_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(1))
            .without_jitter();

        let result =
            retry_with_policy(&policy, &cancel, failing_then_ok(10, counter.clone())).await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("max retries exceeded"));
        assert!(std::error::Error::source(&err).is_some());
        // 1 initial + 2 retries
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_retry() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_max_retries(10)
            .with_initial_delay(Duration::from_secs(10))
            .without_jitter();

        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            child.cancel();
        });

        let start = std::time::Instant::now();
        let result: ScanResult<()> = retry_with_policy(&policy, &cancel, || async {
            Err(ScanError::network("connection reset"))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("operation cancelled"));
        // Returned from inside the first backoff sleep, not after it.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retry_after_hint_overrides_backoff() {
        let counter = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_secs(30))
            .without_jitter();

        let start = std::time::Instant::now();
        let result = retry_with_policy(&policy, &cancel, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ScanError::rate_limit("throttled")
                        .with_retry_after(Duration::from_millis(20)))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_profile_shapes() {
        let discovery = RetryPolicy::discovery();
        assert_eq!(discovery.max_retries, 5);
        assert_eq!(discovery.initial_delay, Duration::from_secs(1));
        assert_eq!(discovery.max_delay, Duration::from_secs(30));
        assert!(discovery.retryable_kinds.contains(&ErrorKind::Provider));

        let analysis = RetryPolicy::analysis();
        assert_eq!(analysis.max_retries, 3);
        assert_eq!(analysis.initial_delay, Duration::from_millis(500));

        let storage = RetryPolicy::storage();
        assert!(storage.retryable_kinds.contains(&ErrorKind::Storage));
        assert!(!storage.retryable_kinds.contains(&ErrorKind::Network));
    }

    #[test]
    fn test_delay_curve_is_capped() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_fraction() {
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = apply_jitter(delay, 0.25);
            assert!(jittered >= Duration::from_millis(750));
            assert!(jittered <= Duration::from_millis(1250));
        }
    }
}
