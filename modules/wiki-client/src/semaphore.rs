//! Concurrency gate that adapts its limit to observed error rates.
//!
//! After at least [`MIN_SAMPLES`] outcomes inside a 60 second window: an
//! error rate above 15% shrinks the limit by 2 (never below the floor), one
//! below 5% grows it by 1 (never above the ceiling). Counters reset after
//! every adjustment and when the window rolls over.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

const WINDOW: Duration = Duration::from_secs(60);
const MIN_SAMPLES: u64 = 10;
const SHRINK_ERROR_RATE: f64 = 0.15;
const GROW_ERROR_RATE: f64 = 0.05;

struct WindowState {
    limit: usize,
    successes: u64,
    failures: u64,
    window_start: Instant,
}

pub struct AdaptiveSemaphore {
    inner: Arc<Semaphore>,
    state: Mutex<WindowState>,
    min: usize,
    max: usize,
}

impl AdaptiveSemaphore {
    pub fn new(initial: usize, min: usize, max: usize) -> Self {
        let initial = initial.clamp(min.max(1), max.max(1));
        Self {
            inner: Arc::new(Semaphore::new(initial)),
            state: Mutex::new(WindowState {
                limit: initial,
                successes: 0,
                failures: 0,
                window_start: Instant::now(),
            }),
            min: min.max(1),
            max: max.max(1),
        }
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // Never poisoned: the closed error can only occur if the semaphore
        // itself is dropped, which Arc prevents while we hold it.
        Arc::clone(&self.inner)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("semaphore closed"))
    }

    pub fn record_success(&self) {
        self.record(false);
    }

    pub fn record_failure(&self) {
        self.record(true);
    }

    pub fn current_limit(&self) -> usize {
        self.state.lock().map(|s| s.limit).unwrap_or(self.min)
    }

    fn record(&self, failed: bool) {
        let Ok(mut state) = self.state.lock() else { return };

        if state.window_start.elapsed() > WINDOW {
            state.successes = 0;
            state.failures = 0;
            state.window_start = Instant::now();
        }
        if failed {
            state.failures += 1;
        } else {
            state.successes += 1;
        }

        let total = state.successes + state.failures;
        if total < MIN_SAMPLES {
            return;
        }
        let error_rate = state.failures as f64 / total as f64;

        if error_rate > SHRINK_ERROR_RATE && state.limit > self.min {
            let new_limit = state.limit.saturating_sub(2).max(self.min);
            let removed = state.limit - new_limit;
            self.inner.forget_permits(removed);
            info!(old = state.limit, new = new_limit, error_rate, "shrinking wiki concurrency");
            state.limit = new_limit;
        } else if error_rate < GROW_ERROR_RATE && state.limit < self.max {
            self.inner.add_permits(1);
            info!(old = state.limit, new = state.limit + 1, error_rate, "growing wiki concurrency");
            state.limit += 1;
        } else {
            return;
        }

        state.successes = 0;
        state.failures = 0;
        state.window_start = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn high_error_rate_shrinks_by_two() {
        let sem = AdaptiveSemaphore::new(5, 1, 10);
        for _ in 0..8 {
            sem.record_success();
        }
        for _ in 0..2 {
            sem.record_failure();
        }
        // 10 samples, 20% errors → shrink by 2
        assert_eq!(sem.current_limit(), 3);
    }

    #[tokio::test]
    async fn low_error_rate_grows_by_one() {
        let sem = AdaptiveSemaphore::new(5, 1, 10);
        for _ in 0..10 {
            sem.record_success();
        }
        assert_eq!(sem.current_limit(), 6);
    }

    #[tokio::test]
    async fn adjustment_resets_counters() {
        let sem = AdaptiveSemaphore::new(5, 1, 10);
        for _ in 0..10 {
            sem.record_success();
        }
        assert_eq!(sem.current_limit(), 6);
        // Nine more outcomes are below the sample floor again.
        for _ in 0..9 {
            sem.record_success();
        }
        assert_eq!(sem.current_limit(), 6);
        sem.record_success();
        assert_eq!(sem.current_limit(), 7);
    }

    #[tokio::test]
    async fn shrink_respects_floor() {
        let sem = AdaptiveSemaphore::new(2, 1, 10);
        for _ in 0..10 {
            sem.record_failure();
        }
        assert_eq!(sem.current_limit(), 1);
        for _ in 0..10 {
            sem.record_failure();
        }
        assert_eq!(sem.current_limit(), 1);
    }

    #[tokio::test]
    async fn grow_respects_ceiling() {
        let sem = AdaptiveSemaphore::new(3, 1, 3);
        for _ in 0..10 {
            sem.record_success();
        }
        assert_eq!(sem.current_limit(), 3);
    }

    #[tokio::test]
    async fn moderate_error_rate_holds_steady() {
        let sem = AdaptiveSemaphore::new(5, 1, 10);
        // 10% error rate: between the two thresholds
        for _ in 0..9 {
            sem.record_success();
        }
        sem.record_failure();
        assert_eq!(sem.current_limit(), 5);
    }

    #[tokio::test]
    async fn permits_are_acquirable_up_to_limit() {
        let sem = AdaptiveSemaphore::new(2, 1, 4);
        let _a = sem.acquire().await;
        let _b = sem.acquire().await;
        assert!(tokio::time::timeout(Duration::from_millis(20), sem.acquire())
            .await
            .is_err());
    }
}
