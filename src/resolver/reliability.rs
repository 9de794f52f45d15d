//! Reliability scoring from observed success rate and latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Weights and constants of the reliability formula.
///
/// `score = base_weight * base + success_weight * success_rate + latency_weight * latency_factor`
/// where `latency_factor = min(1, latency_target_ms / max(avg_latency_ms, latency_floor_ms))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityWeights {
    pub base_weight: f64,
    pub success_weight: f64,
    pub latency_weight: f64,
    /// Average latency at or below which no latency penalty applies
    pub latency_target_ms: f64,
    /// Lower bound applied to the average latency before dividing
    pub latency_floor_ms: f64,
}

impl Default for ReliabilityWeights {
    fn default() -> Self {
        Self {
            base_weight: 0.4,
            success_weight: 0.4,
            latency_weight: 0.2,
            latency_target_ms: 5000.0,
            latency_floor_ms: 100.0,
        }
    }
}

impl ReliabilityWeights {
    /// Combines a base score with observed counters.
    ///
    /// With no observations the score is `base` alone.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn score(&self, base: f64, successes: u64, failures: u64, total_latency_ms: u64) -> f64 {
        let total = successes.saturating_add(failures);
        if total == 0 {
            return base;
        }
        let success_rate = successes as f64 / total as f64;
        let avg_latency_ms = total_latency_ms as f64 / total as f64;
        let latency_factor =
            (self.latency_target_ms / avg_latency_ms.max(self.latency_floor_ms)).min(1.0);

        self.base_weight * base + self.success_weight * success_rate + self.latency_weight * latency_factor
    }
}

/// Lock-free success/failure/latency counters for one resolver.
#[derive(Debug)]
pub struct ReliabilityTracker {
    base: f64,
    weights: ReliabilityWeights,
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl ReliabilityTracker {
    /// Creates a tracker for a source with the given base reliability.
    #[must_use]
    pub fn new(base: f64, weights: ReliabilityWeights) -> Self {
        Self {
            base,
            weights,
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }

    /// Records a finished request.
    #[allow(clippy::cast_possible_truncation)]
    pub fn record(&self, success: bool, latency: Duration) {
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a failure that produced no response (transport error, exhausted 429s).
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current score, recomputed from the counters on every call.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.weights.score(
            self.base,
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
            self.total_latency_ms.load(Ordering::Relaxed),
        )
    }

    /// Base reliability of the source.
    #[must_use]
    pub fn base(&self) -> f64 {
        self.base
    }

    /// `(successes, failures)` observed so far.
    #[must_use]
    pub fn counts(&self) -> (u64, u64) {
        (
            self.successes.load(Ordering::Relaxed),
            self.failures.load(Ordering::Relaxed),
        )
    }
}
