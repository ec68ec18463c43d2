//! Retry policy shared by LLM and wiki HTTP calls.
//!
//! One helper parameterized by the error-classification function. The policy
//! table is fixed: per class, a max retry count and a backoff curve. Delays
//! are capped at 30 seconds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{ErrorClass, LlmError};

/// Upper bound on any single backoff sleep.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry budget and backoff shape for one error class.
#[derive(Debug, Clone, Copy)]
pub struct RetryRule {
    pub max_retries: u32,
    /// Backoff multiplier base: delay = initial · base^attempt.
    pub backoff_base: f64,
}

/// Policy table: Timeout ≤3, RateLimit ≤5 (aggressive 3ⁿ), ServerBusy ≤4,
/// NotFound 0, Network ≤3. Everything else is not retried.
pub fn rule_for(class: ErrorClass) -> RetryRule {
    match class {
        ErrorClass::Timeout => RetryRule { max_retries: 3, backoff_base: 2.0 },
        ErrorClass::RateLimit => RetryRule { max_retries: 5, backoff_base: 3.0 },
        ErrorClass::ServerBusy => RetryRule { max_retries: 4, backoff_base: 2.0 },
        ErrorClass::Network => RetryRule { max_retries: 3, backoff_base: 2.0 },
        ErrorClass::NotFound
        | ErrorClass::ContentFilter
        | ErrorClass::BadRequest
        | ErrorClass::Unknown => RetryRule { max_retries: 0, backoff_base: 1.0 },
    }
}

/// Delay before retry number `attempt` (0-based) for the given class,
/// without jitter. Capped at [`MAX_RETRY_DELAY`].
pub fn retry_delay(initial: Duration, attempt: u32, class: ErrorClass) -> Duration {
    let rule = rule_for(class);
    let factor = rule.backoff_base.powi(attempt as i32 + 1);
    let delay = initial.mul_f64(factor);
    delay.min(MAX_RETRY_DELAY)
}

/// Run `op`, retrying per the policy table, with `classify` deciding the
/// error class of each failure. `label` is used for log context.
///
/// The worst case for an error of class C is exactly `rule_for(C).max_retries + 1`
/// invocations of `op`. Non-retryable classes return after the first failure.
pub async fn retry_classified<T, E, F, Fut, C>(
    label: &str,
    initial_delay: Duration,
    classify: C,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    C: Fn(&E) -> ErrorClass,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let class = classify(&err);
                let rule = rule_for(class);
                if attempt >= rule.max_retries {
                    if rule.max_retries > 0 {
                        warn!(label, ?class, attempts = attempt + 1, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
                let delay = retry_delay(initial_delay, attempt, class);
                let jitter = Duration::from_millis(rand::rng().random_range(0..250));
                debug!(label, ?class, attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay + jitter).await;
                attempt += 1;
            }
        }
    }
}

/// [`retry_classified`] specialized to [`LlmError`]'s own classification.
pub async fn retry_with_policy<T, F, Fut>(
    label: &str,
    initial_delay: Duration,
    op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    retry_classified(label, initial_delay, LlmError::class, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn rate_limit_backoff_is_aggressive() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0, ErrorClass::RateLimit), Duration::from_secs(3));
        assert_eq!(retry_delay(base, 1, ErrorClass::RateLimit), Duration::from_secs(9));
        assert_eq!(retry_delay(base, 2, ErrorClass::RateLimit), Duration::from_secs(27));
        // 81s caps at 30s
        assert_eq!(retry_delay(base, 3, ErrorClass::RateLimit), MAX_RETRY_DELAY);
    }

    #[test]
    fn server_busy_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(retry_delay(base, 0, ErrorClass::ServerBusy), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 1, ErrorClass::ServerBusy), Duration::from_secs(4));
    }

    #[test]
    fn not_found_never_retries() {
        assert_eq!(rule_for(ErrorClass::NotFound).max_retries, 0);
        assert_eq!(rule_for(ErrorClass::ContentFilter).max_retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn worst_case_attempt_counts_match_table() {
        for (class, expected) in [
            (ErrorClass::Timeout, 4u32),
            (ErrorClass::RateLimit, 6),
            (ErrorClass::ServerBusy, 5),
            (ErrorClass::Network, 4),
            (ErrorClass::NotFound, 1),
            (ErrorClass::BadRequest, 1),
        ] {
            let calls = AtomicU32::new(0);
            let result: Result<(), _> =
                retry_with_policy("test", Duration::from_millis(1), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        Err(match class {
                            ErrorClass::Timeout => LlmError::Timeout(Duration::from_secs(1)),
                            ErrorClass::RateLimit => LlmError::RateLimit("x".into()),
                            ErrorClass::ServerBusy => LlmError::ServerBusy("x".into()),
                            ErrorClass::Network => LlmError::Network("x".into()),
                            ErrorClass::NotFound => LlmError::NotFound("x".into()),
                            _ => LlmError::BadRequest("x".into()),
                        })
                    }
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), expected, "class {class:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_policy("test", Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Err(LlmError::RateLimit("429".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
