//! Progress reporting — aggregate views over the registry and a ledger.
//!
//! A report is a pure function of the registry, one user's unlock ledger and
//! a snapshot (the snapshot is only needed for hints). Records for ids the
//! registry no longer knows are ignored.

use std::cmp::Reverse;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::config::UnlockConfig;
use crate::fragment::{FragmentCategory, FragmentDefinition, FragmentRegistry};
use crate::response::MemoryFragmentResponse;
use crate::snapshot::ProgressionSnapshot;
use crate::types::FragmentId;
use crate::unlock::UnlockLedger;

/// Hint text for a locked fragment with nothing left to meet.
const READY_HINT: &str = "Ready to unlock on your next message";

/// Totals and fragment list for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// The category.
    pub category: FragmentCategory,
    /// Fragments in the category.
    pub total: usize,
    /// How many of them are unlocked.
    pub unlocked: usize,
    /// Every fragment in the category, in order.
    pub fragments: Vec<MemoryFragmentResponse>,
}

/// One "what to do next" suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockHint {
    /// Fragment the hint points at.
    pub fragment_id: FragmentId,
    /// Its title.
    pub title: String,
    /// Its category.
    pub category: FragmentCategory,
    /// Mean normalised distance to its thresholds, in `[0, 1]`.
    pub remaining: f64,
    /// The requirement furthest from being met.
    pub requirement: String,
}

/// Everything the memory screen shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    /// Registry size.
    pub total_fragments: usize,
    /// Unlocked fragments the registry knows about.
    pub unlocked_count: usize,
    /// Percentage unlocked, one decimal place.
    pub unlock_progress: f64,
    /// Per-category breakdown in category order.
    pub categories: Vec<CategoryProgress>,
    /// Most recent unlocks, newest first.
    pub recent_unlocks: Vec<MemoryFragmentResponse>,
    /// Nearest locked fragments.
    pub next_unlock_hints: Vec<UnlockHint>,
}

/// Builds [`ProgressSummary`] values.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    registry: Arc<FragmentRegistry>,
    config: UnlockConfig,
}

impl ProgressReporter {
    /// Create a reporter over a shared registry.
    #[must_use]
    pub fn new(registry: Arc<FragmentRegistry>, config: UnlockConfig) -> Self {
        Self { registry, config }
    }

    /// Build the full report for one user.
    #[must_use]
    pub fn report(&self, ledger: &UnlockLedger, snapshot: &ProgressionSnapshot) -> ProgressSummary {
        let total_fragments = self.registry.len();
        let unlocked_count = self
            .registry
            .iter()
            .filter(|f| ledger.is_unlocked(&f.id))
            .count();

        ProgressSummary {
            total_fragments,
            unlocked_count,
            unlock_progress: unlock_percentage(unlocked_count, total_fragments),
            categories: self.categories(ledger),
            recent_unlocks: self.recent_unlocks(ledger),
            next_unlock_hints: self.hints(ledger, snapshot),
        }
    }

    fn categories(&self, ledger: &UnlockLedger) -> Vec<CategoryProgress> {
        FragmentCategory::ALL
            .into_iter()
            .map(|category| {
                let fragments: Vec<MemoryFragmentResponse> = self
                    .registry
                    .in_category(category)
                    .map(|f| MemoryFragmentResponse::new(f, ledger.get(&f.id)))
                    .collect();
                CategoryProgress {
                    category,
                    total: fragments.len(),
                    unlocked: fragments.iter().filter(|f| f.is_unlocked).count(),
                    fragments,
                }
            })
            .collect()
    }

    /// Newest first; ties by `(category, order)`.
    fn recent_unlocks(&self, ledger: &UnlockLedger) -> Vec<MemoryFragmentResponse> {
        let mut unlocked: Vec<(&FragmentDefinition, _)> = ledger
            .unlocked()
            .filter_map(|r| self.registry.get(&r.fragment_id).map(|f| (f, r)))
            .collect();
        unlocked.sort_by_key(|(f, r)| (Reverse(r.unlocked_at), f.sort_key()));

        unlocked
            .into_iter()
            .take(self.config.recent_unlocks_window)
            .map(|(f, r)| MemoryFragmentResponse::new(f, Some(r)))
            .collect()
    }

    /// Zero-condition fragments first, then by remaining distance, then by
    /// `(category, order)`.
    fn hints(&self, ledger: &UnlockLedger, snapshot: &ProgressionSnapshot) -> Vec<UnlockHint> {
        let mut locked: Vec<(&FragmentDefinition, f64)> = self
            .registry
            .iter()
            .filter(|f| !ledger.is_unlocked(&f.id))
            .map(|f| (f, f.conditions.remaining_distance(snapshot)))
            .collect();
        locked.sort_by_key(|(f, remaining)| {
            (!f.conditions.is_empty(), OrderedFloat(*remaining), f.sort_key())
        });

        locked
            .into_iter()
            .take(self.config.hint_count)
            .map(|(f, remaining)| UnlockHint {
                fragment_id: f.id.clone(),
                title: f.title.clone(),
                category: f.category,
                remaining,
                requirement: f
                    .conditions
                    .dominant_remaining(snapshot)
                    .map_or_else(|| READY_HINT.to_string(), |c| c.hint_text(snapshot)),
            })
            .collect()
    }
}

/// `unlocked / total * 100`, rounded to one decimal; 0.0 when `total` is 0.
#[must_use]
pub fn unlock_percentage(unlocked: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = unlocked as f64 / total as f64;
    (ratio * 1000.0).round() / 10.0
}
