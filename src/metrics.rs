//! Engine metrics.
//!
//! Process-wide counters for the decisions the orchestrator makes: memory
//! hits, blacklist short-circuits, backend traffic, rejected segments and
//! fallbacks. Exposed by `GET /metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Counters for translation decisions.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Requests answered by an exact memory match
    exact_hits: AtomicUsize,

    /// Requests answered by a promoted fuzzy memory match
    fuzzy_hits: AtomicUsize,

    /// Requests that needed a live backend translation
    tm_misses: AtomicUsize,

    /// Requests that were nothing but blacklisted terms
    blacklist_only: AtomicUsize,

    backend_calls: AtomicUsize,
    backend_failures: AtomicUsize,

    /// Segments whose backend output was discarded (multi-line, empty)
    rejected_segments: AtomicUsize,

    /// Requests answered with a precomputed suggestion after a failure
    fallbacks: AtomicUsize,
}

static METRICS: OnceLock<EngineMetrics> = OnceLock::new();

impl EngineMetrics {
    /// The process-wide instance.
    pub fn global() -> &'static EngineMetrics {
        METRICS.get_or_init(EngineMetrics::default)
    }

    pub fn record_exact_hit(&self) {
        self.exact_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fuzzy_hit(&self) {
        self.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tm_miss(&self) {
        self.tm_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blacklist_only(&self) {
        self.blacklist_only.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_call(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_segment(&self) {
        self.rejected_segments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of every counter plus derived rates.
    pub fn report(&self) -> MetricsReport {
        let exact_hits = self.exact_hits.load(Ordering::Relaxed);
        let fuzzy_hits = self.fuzzy_hits.load(Ordering::Relaxed);
        let tm_misses = self.tm_misses.load(Ordering::Relaxed);
        let lookups = exact_hits + fuzzy_hits + tm_misses;
        let tm_hit_rate = if lookups > 0 {
            ((exact_hits + fuzzy_hits) as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        let backend_calls = self.backend_calls.load(Ordering::Relaxed);
        let backend_failures = self.backend_failures.load(Ordering::Relaxed);
        let backend_success_rate = if backend_calls > 0 {
            (backend_calls.saturating_sub(backend_failures) as f64 / backend_calls as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            exact_hits,
            fuzzy_hits,
            tm_misses,
            tm_hit_rate,
            blacklist_only: self.blacklist_only.load(Ordering::Relaxed),
            backend_calls,
            backend_failures,
            backend_success_rate,
            rejected_segments: self.rejected_segments.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub exact_hits: usize,
    pub fuzzy_hits: usize,
    pub tm_misses: usize,

    /// Memory hit rate as a percentage (0-100)
    pub tm_hit_rate: f64,

    pub blacklist_only: usize,
    pub backend_calls: usize,
    pub backend_failures: usize,

    /// Backend success rate as a percentage (0-100)
    pub backend_success_rate: f64,

    pub rejected_segments: usize,
    pub fallbacks: usize,
}
