//! Runtime counters for the progression service.
//!
//! Lock-free `AtomicU64` counters incremented on the request path and read
//! on export. One set is owned by each [`crate::service::ProgressionService`];
//! there is no global instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for progression events.
#[derive(Debug)]
pub struct ProgressionCounters {
    /// Choices validated and applied.
    pub choices_applied: AtomicU64,
    /// Unlock evaluation passes run.
    pub evaluations: AtomicU64,
    /// Fragments unlocked and persisted.
    pub unlocks: AtomicU64,
    /// Write attempts that failed and were retried.
    pub persistence_retries: AtomicU64,
    /// Writes that failed after every attempt.
    pub persistence_failures: AtomicU64,
    /// Out-of-range fields clamped on load.
    pub clamp_repairs: AtomicU64,
}

impl ProgressionCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            choices_applied: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            unlocks: AtomicU64::new(0),
            persistence_retries: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            clamp_repairs: AtomicU64::new(0),
        }
    }

    /// Increment a counter by `n`.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            choices_applied: self.choices_applied.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
            unlocks: self.unlocks.load(Ordering::Relaxed),
            persistence_retries: self.persistence_retries.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            clamp_repairs: self.clamp_repairs.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProgressionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Choices applied.
    pub choices_applied: u64,
    /// Evaluation passes.
    pub evaluations: u64,
    /// Fragments unlocked.
    pub unlocks: u64,
    /// Retried writes.
    pub persistence_retries: u64,
    /// Failed writes.
    pub persistence_failures: u64,
    /// Clamp repairs.
    pub clamp_repairs: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let rows = [
            ("choices_applied", "Choices applied", self.choices_applied),
            ("evaluations", "Unlock evaluation passes", self.evaluations),
            ("unlocks", "Fragments unlocked", self.unlocks),
            ("persistence_retries", "Store writes retried", self.persistence_retries),
            ("persistence_failures", "Store writes failed after retries", self.persistence_failures),
            ("clamp_repairs", "Out-of-range fields clamped on load", self.clamp_repairs),
        ];
        let mut out = String::new();
        for (name, help, value) in rows {
            out.push_str(&format!(
                "# HELP reverie_{name}_total {help}\n\
                 # TYPE reverie_{name}_total counter\n\
                 reverie_{name}_total {value}\n"
            ));
        }
        out
    }
}
