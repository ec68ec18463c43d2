//! Request metrics for the wiki fetchers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use llm_client::ErrorClass;
use serde::Serialize;

#[derive(Default)]
struct Counters {
    requests: u64,
    successes: u64,
    failures: u64,
    total_response_ms: u64,
    errors_by_class: HashMap<String, u64>,
    cache_hits: u64,
    cache_misses: u64,
}

/// Shared collector; cheap to record from concurrent fetches.
#[derive(Default)]
pub struct FetchMetrics {
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_response_ms: u64,
    pub errors_by_class: HashMap<String, u64>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed: Duration) {
        if let Ok(mut c) = self.counters.lock() {
            c.requests += 1;
            c.successes += 1;
            c.total_response_ms += elapsed.as_millis() as u64;
        }
    }

    pub fn record_failure(&self, class: ErrorClass, elapsed: Duration) {
        if let Ok(mut c) = self.counters.lock() {
            c.requests += 1;
            c.failures += 1;
            c.total_response_ms += elapsed.as_millis() as u64;
            *c.errors_by_class.entry(format!("{class:?}")).or_default() += 1;
        }
    }

    pub fn record_cache_hit(&self) {
        if let Ok(mut c) = self.counters.lock() {
            c.cache_hits += 1;
        }
    }

    pub fn record_cache_miss(&self) {
        if let Ok(mut c) = self.counters.lock() {
            c.cache_misses += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = match self.counters.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        let lookups = c.cache_hits + c.cache_misses;
        MetricsSnapshot {
            requests: c.requests,
            successes: c.successes,
            failures: c.failures,
            avg_response_ms: if c.requests > 0 { c.total_response_ms / c.requests } else { 0 },
            errors_by_class: c.errors_by_class.clone(),
            cache_hits: c.cache_hits,
            cache_misses: c.cache_misses,
            cache_hit_rate: if lookups > 0 { c.cache_hits as f64 / lookups as f64 } else { 0.0 },
        }
    }
}
